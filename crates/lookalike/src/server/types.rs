use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::Deserialize;

/// `POST /images/load`
#[derive(TryFromMultipart)]
pub struct LoadForm {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<Bytes>,
    pub profile: String,
}

/// `POST /images/check`
#[derive(TryFromMultipart)]
pub struct CheckForm {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<Bytes>,
    pub profile: Option<String>,
    pub threshold: Option<f32>,
    pub uniq_create: Option<bool>,
}

/// `POST /images/profiles`
#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    pub name: String,
}

/// `DELETE /images/profiles/{name}`
#[derive(Debug, Deserialize)]
pub struct DeleteProfileQuery {
    #[serde(default)]
    pub cascade: bool,
}

/// `GET /blobs/{key}`; `Key` is carried in the path as well.
#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    #[serde(rename = "Expires")]
    pub expires: i64,
}
