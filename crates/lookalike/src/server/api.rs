use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use axum_typed_multipart::TypedMultipart;
use lookalike_core::{CheckOptions, DeletePolicy, ImageRecord, Profile, StoredImage};

use super::error::{ApiError, Result};
use super::state::AppState;
use super::types::*;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Fingerprint an upload and store it under a profile.
pub async fn load_image(
    State(state): State<Arc<AppState>>,
    TypedMultipart(form): TypedMultipart<LoadForm>,
) -> Result<(StatusCode, Json<ImageRecord>)> {
    tracing::info!(
        "Loading {} bytes into profile {:?}",
        form.file.contents.len(),
        form.profile
    );
    let record = state
        .images
        .create_image(
            &form.file.contents[..],
            form.file.metadata.file_name,
            &form.profile,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Score an upload against every stored image; responds with the scores only.
pub async fn check_image(
    State(state): State<Arc<AppState>>,
    TypedMultipart(form): TypedMultipart<CheckForm>,
) -> Result<Json<Vec<f32>>> {
    if let Some(threshold) = form.threshold {
        if !threshold.is_finite() {
            return Err(ApiError::BadRequest(format!(
                "threshold must be a finite number, got {threshold}"
            )));
        }
    }

    let options = CheckOptions {
        profile: form.profile,
        threshold: form.threshold,
        create_if_unique: form.uniq_create.unwrap_or(false),
        file_name: form.file.metadata.file_name,
    };
    let outcome = state
        .images
        .check_image(&form.file.contents[..], options)
        .await?;

    if let Some(created) = &outcome.created {
        tracing::info!("Unique upload stored as image {}", created.id);
    }
    Ok(Json(outcome.scores.iter().map(|s| s.score).collect()))
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<StoredImage>> {
    Ok(Json(state.images.get_image(id).await?))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.images.delete_image(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a profile; responds with every profile, the new one included.
pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProfileBody>,
) -> Result<(StatusCode, Json<Vec<Profile>>)> {
    state.profiles.create_profile(&body.name).await?;
    let profiles = state.profiles.list_profiles().await?;
    Ok((StatusCode::CREATED, Json(profiles)))
}

pub async fn list_profiles(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Profile>>> {
    Ok(Json(state.profiles.list_profiles().await?))
}

pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<DeleteProfileQuery>,
) -> Result<StatusCode> {
    let policy = if query.cascade {
        DeletePolicy::Cascade
    } else {
        DeletePolicy::Reject
    };
    state.profiles.delete_profile(&name, policy).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Serve blob bytes behind a presigned URL.
pub async fn read_blob(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<BlobQuery>,
) -> Result<impl IntoResponse> {
    let bytes = state.images.read_blob(&key, query.expires).await?;
    Ok(([(header::CONTENT_TYPE, content_type(&key))], bytes))
}

fn content_type(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("abc.jpg"), "image/jpeg");
        assert_eq!(content_type("dir/abc.PNG"), "image/png");
        assert_eq!(content_type("abc"), "application/octet-stream");
    }
}
