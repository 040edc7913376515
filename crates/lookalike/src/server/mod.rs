//! HTTP API.
//!
//! | Method | Path                          | Body                          |
//! |--------|-------------------------------|-------------------------------|
//! | GET    | `/health`                     |                               |
//! | POST   | `/images/load`                | multipart `file`, `profile`   |
//! | POST   | `/images/check`               | multipart `file`, `profile?`, `threshold?`, `uniq_create?` |
//! | GET    | `/images/{id}`                |                               |
//! | DELETE | `/images/{id}`                |                               |
//! | GET    | `/images/profiles`            |                               |
//! | POST   | `/images/profiles`            | JSON `{"name": ...}`, returns all profiles |
//! | DELETE | `/images/profiles/{name}`     | query `cascade?`              |
//! | GET    | `/blobs/{key}`                | query `Key`, `Expires`        |

mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

pub use self::state::*;

/// Build the API router.
pub fn create_app(state: Arc<AppState>, max_body_mb: usize) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/images/load", post(api::load_image))
        .route("/images/check", post(api::check_image))
        .route(
            "/images/profiles",
            get(api::list_profiles).post(api::create_profile),
        )
        .route("/images/profiles/{name}", axum::routing::delete(api::delete_profile))
        .route("/images/{id}", get(api::get_image).delete(api::delete_image))
        .route("/blobs/{*key}", get(api::read_blob))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_mb * 1024 * 1024))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::Path;

    use lookalike_core::testing::{png_bytes, test_config, PooledPixels};
    use lookalike_core::LocalBlobStore;
    use reqwest::multipart::{Form, Part};
    use reqwest::StatusCode;
    use serde_json::{json, Value};

    use super::*;

    fn png(seed: u32) -> Vec<u8> {
        png_bytes(64, 48, seed)
    }

    fn config(dir: &Path, addr: SocketAddr) -> lookalike_core::Config {
        let mut config = test_config(dir);
        config.storage.base_url = format!("http://{addr}/blobs");
        config
    }

    /// Serve the API on an ephemeral port; returns its base URL.
    async fn spawn_server(dir: &Path) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = config(dir, addr);

        let store = lookalike_core::store::connect(&config).await.unwrap();
        let blobs = Arc::new(LocalBlobStore::from_config(&config));
        let state = Arc::new(AppState::new(&config, Arc::new(PooledPixels::new()), store, blobs));
        let app = create_app(state, config.server.max_body_mb);

        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn file_part(bytes: Vec<u8>) -> Part {
        Part::bytes(bytes).file_name("upload.png")
    }

    async fn create_profile(client: &reqwest::Client, base: &str, name: &str) {
        let resp = client
            .post(format!("{base}/images/profiles"))
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    async fn load(client: &reqwest::Client, base: &str, profile: &str, bytes: Vec<u8>) -> Value {
        let form = Form::new()
            .part("file", file_part(bytes))
            .text("profile", profile.to_string());
        let resp = client
            .post(format!("{base}/images/load"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;

        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_profiles_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        create_profile(&client, &base, "catalog").await;

        let created: Value = client
            .post(format!("{base}/images/profiles"))
            .json(&json!({ "name": "archive" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<&str> = created
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["catalog", "archive"]);

        let dup = client
            .post(format!("{base}/images/profiles"))
            .json(&json!({ "name": "catalog" }))
            .send()
            .await
            .unwrap();
        assert_eq!(dup.status(), StatusCode::CONFLICT);

        let profiles: Value = client
            .get(format!("{base}/images/profiles"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(profiles.as_array().unwrap().len(), 2);
        assert_eq!(profiles[0]["name"], "catalog");

        load(&client, &base, "catalog", png(0)).await;

        let rejected = client
            .delete(format!("{base}/images/profiles/catalog"))
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::CONFLICT);
        let body: Value = rejected.json().await.unwrap();
        assert_eq!(body["error"], "constraint_violation");

        let cascaded = client
            .delete(format!("{base}/images/profiles/catalog?cascade=true"))
            .send()
            .await
            .unwrap();
        assert_eq!(cascaded.status(), StatusCode::NO_CONTENT);

        let missing = client
            .delete(format!("{base}/images/profiles/catalog"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_load_get_and_delete_image() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();
        create_profile(&client, &base, "p").await;

        let bytes = png(0);
        let record = load(&client, &base, "p", bytes.clone()).await;
        assert!(record.get("embedding").is_none());
        assert_eq!(record["file_name"], "upload.png");
        let id = record["id"].as_i64().unwrap();

        let stored: Value = client
            .get(format!("{base}/images/{id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stored["id"], id);
        let url = stored["url"].as_str().unwrap();
        assert!(url.starts_with(&format!("{base}/blobs/")));

        let blob = client.get(url).send().await.unwrap();
        assert_eq!(blob.status(), StatusCode::OK);
        assert_eq!(blob.headers()["content-type"], "image/png");
        assert_eq!(blob.bytes().await.unwrap().to_vec(), bytes);

        let deleted = client
            .delete(format!("{base}/images/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let gone = client
            .get(format!("{base}/images/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
        let body: Value = gone.json().await.unwrap();
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_load_rejects_garbage_and_unknown_profile() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();
        create_profile(&client, &base, "p").await;

        let form = Form::new()
            .part("file", file_part(b"definitely not an image".to_vec()))
            .text("profile", "p");
        let resp = client
            .post(format!("{base}/images/load"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "invalid_image");

        let form = Form::new()
            .part("file", file_part(png(0)))
            .text("profile", "nobody");
        let resp = client
            .post(format!("{base}/images/load"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_check_returns_scores() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();
        create_profile(&client, &base, "p").await;

        let empty: Vec<f32> = client
            .post(format!("{base}/images/check"))
            .multipart(Form::new().part("file", file_part(png(0))))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(empty.is_empty());

        load(&client, &base, "p", png(0)).await;
        load(&client, &base, "p", png(7)).await;

        let scores: Vec<f32> = client
            .post(format!("{base}/images/check"))
            .multipart(Form::new().part("file", file_part(png(0))))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 1.0).abs() < 1e-5);
        assert!(scores[0] >= scores[1]);

        let filtered: Vec<f32> = client
            .post(format!("{base}/images/check"))
            .multipart(
                Form::new()
                    .part("file", file_part(png(0)))
                    .text("threshold", "0.99"),
            )
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn test_check_uniq_create() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();
        create_profile(&client, &base, "p").await;

        let check = |bytes: Vec<u8>| {
            let client = client.clone();
            let base = base.clone();
            async move {
                let form = Form::new()
                    .part("file", file_part(bytes))
                    .text("profile", "p")
                    .text("uniq_create", "true");
                client
                    .post(format!("{base}/images/check"))
                    .multipart(form)
                    .send()
                    .await
                    .unwrap()
            }
        };

        let first = check(png(0)).await;
        assert_eq!(first.status(), StatusCode::OK);
        let again = check(png(0)).await;
        assert_eq!(again.status(), StatusCode::OK);

        // The first call stored the image, the second found it and did not.
        let scores: Vec<f32> = client
            .post(format!("{base}/images/check"))
            .multipart(Form::new().part("file", file_part(png(0))))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(scores.len(), 1);
    }

    #[tokio::test]
    async fn test_check_rejects_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/images/check"))
            .multipart(
                Form::new()
                    .part("file", file_part(png(0)))
                    .text("threshold", "NaN"),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_expired_blob_link() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();
        create_profile(&client, &base, "p").await;
        let record = load(&client, &base, "p", png(0)).await;
        let key = record["storage_key"].as_str().unwrap();

        let resp = client
            .get(format!("{base}/blobs/{key}?Key={key}&Expires=1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
