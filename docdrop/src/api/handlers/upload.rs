use crate::AppState;
use crate::api::models::upload::{ErrorResponse, UploadForm, UploadResponse};
use crate::errors::{Error, Result};
use crate::storage::{FileStore, StagedFile};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use futures::{StreamExt, TryStreamExt};

/// Name of the multipart part that carries the upload
pub const FILE_FIELD: &str = "file";

#[utoipa::path(
    post,
    path = "/upload",
    tag = "upload",
    summary = "Upload file",
    description = "Save the `file` part of a multipart form into the target directory under its client-supplied filename. \
                   Other form fields are ignored. Only the first `file` part is stored.",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File saved", body = UploadResponse),
        (status = 400, description = "No file part, empty or unsafe filename, or malformed body", body = ErrorResponse),
        (status = 409, description = "Destination exists and the collision policy is `reject`", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    // A body that is not multipart at all simply has no file part
    let multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "Request body is not multipart/form-data");
        Error::NoFilePart
    })?;

    // Nothing is published until the whole body has parsed cleanly
    let staged = stage_file_part(state.store.as_ref(), multipart).await?;
    let staged = staged.ok_or(Error::NoFilePart)?;
    let saved = state.store.publish(staged).await?;

    tracing::info!(
        path = %saved.path.display(),
        bytes = saved.bytes,
        "Saved uploaded file"
    );

    Ok(Json(UploadResponse::ok()))
}

/// Read every part of the form, staging the first `file` part. A staged upload is discarded if
/// anything after it fails to parse.
async fn stage_file_part(store: &dyn FileStore, mut multipart: Multipart) -> Result<Option<StagedFile>> {
    let mut staged: Option<StagedFile> = None;

    let result = async {
        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            // Parts without a filename parameter are plain form fields, even when named `file`
            let Some(filename) = field.file_name().map(str::to_string) else {
                let mut len = 0usize;
                while let Some(chunk) = field.chunk().await? {
                    len += chunk.len();
                }
                tracing::debug!(field = %name, bytes = len, "Received form field");
                continue;
            };

            tracing::debug!(
                field = %name,
                filename = %filename,
                content_type = ?field.content_type(),
                "Received file part"
            );

            if name != FILE_FIELD || staged.is_some() {
                // Dropping the field skips its body
                continue;
            }

            let content = field.map_err(Error::from).boxed();
            staged = Some(store.stage(&filename, content).await?);
        }
        Ok::<_, Error>(())
    }
    .await;

    match result {
        Ok(()) => Ok(staged),
        Err(e) => {
            if let Some(staged) = staged.take() {
                store.discard(staged).await;
            }
            Err(e)
        }
    }
}
