//! OpenAPI documentation, served as JSON at `/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::api;
use crate::api::models::upload::{ErrorResponse, UploadForm, UploadResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "docdrop API",
        description = "Drop a single file into the configured target directory."
    ),
    paths(api::handlers::upload::upload_file),
    components(schemas(UploadResponse, ErrorResponse, UploadForm)),
    tags((name = "upload", description = "File upload"))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_path_documented() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().unwrap();

        assert!(doc.paths.paths.contains_key("/upload"));
        assert!(json.contains("multipart/form-data"));
        assert!(json.contains("UploadResponse"));
    }
}
