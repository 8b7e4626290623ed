use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body returned after a file has been saved
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UploadResponse {
    /// Always `true`
    pub success: bool,
}

impl UploadResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Body returned for every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human-readable reason, e.g. `No file part`
    pub error: String,
}

/// Multipart form accepted by `POST /upload` (documentation only)
#[derive(ToSchema)]
#[allow(unused)]
pub struct UploadForm {
    /// The file to store. Its filename is used as the destination name.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
