use crate::api::models::upload::ErrorResponse;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The request carried no `file` part with a filename
    #[error("No file part")]
    NoFilePart,

    /// The `file` part was present but its filename was empty
    #[error("No selected file")]
    NoSelectedFile,

    /// The filename is not a single plain path component
    #[error("Invalid filename {filename:?}")]
    InvalidFilename { filename: String },

    /// Malformed request body
    #[error("{message}")]
    BadRequest { message: String },

    /// Destination already exists and the collision policy forbids replacing it
    #[error("File {filename:?} already exists")]
    Conflict { filename: String },

    /// Request body exceeded the configured limit
    #[error("Payload too large")]
    PayloadTooLarge,

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Filesystem error while writing an upload
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NoFilePart | Error::NoSelectedFile | Error::InvalidFilename { .. } | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Internal { .. } | Error::Io(_) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::NoFilePart => "No file part".to_string(),
            Error::NoSelectedFile => "No selected file".to_string(),
            Error::InvalidFilename { .. } => "Invalid filename".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::Conflict { .. } => "File already exists".to_string(),
            Error::PayloadTooLarge => "Payload too large".to_string(),
            Error::Internal { .. } | Error::Io(_) | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Io(_) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorResponse {
            error: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Multipart failures are the client's fault, except when the body limit was hit
impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge
        } else {
            Error::BadRequest {
                message: format!("Failed to parse multipart data: {}", err.body_text()),
            }
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
