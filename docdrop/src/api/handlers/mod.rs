//! HTTP request handlers.
//!
//! - [`upload`]: multipart file upload into the target directory

pub mod upload;
