//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! The only write endpoint is `POST /upload`. Its OpenAPI document is served at
//! `/openapi.json` and rendered at `/docs`.

pub mod handlers;
pub mod models;
