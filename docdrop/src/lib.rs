//! # docdrop: an HTTP drop box for a consume directory
//!
//! `docdrop` accepts one file per request on `POST /upload` and saves it into a single,
//! pre-existing target directory under the filename the client supplied. It is meant to sit in
//! front of a document-ingestion pipeline that watches that directory.
//!
//! ## Request Flow
//!
//! The [`api::handlers::upload`] handler walks the multipart form. Every part is logged at
//! `debug`; the first part named `file` that carries a filename is streamed to the
//! [`storage::FileStore`] held in [`AppState`]. The store rejects empty and unsafe filenames,
//! writes into a hidden staging file, and publishes it under the final name according to the
//! configured [`config::ConflictPolicy`]. Success is `{"success": true}`; every failure is
//! `{"error": "<reason>"}` with a matching status code (see [`errors::Error`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use docdrop::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = docdrop::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     docdrop::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(docdrop::shutdown_signal()).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use openapi::ApiDoc;
use std::sync::Arc;
use storage::{FileStore, LocalDirectory};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .store(Arc::new(LocalDirectory::new("/srv/consume", ConflictPolicy::Overwrite)))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn FileStore>,
}

/// Build the HTTP router with all routes and middleware.
pub fn build_router(state: &AppState) -> Router {
    let body_limit = match state.config.upload.max_body_size {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/upload", post(api::handlers::upload::upload_file).layer(body_limit))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Main application struct that owns the router and its configuration.
///
/// 1. **Create**: [`Application::new`] checks the target directory and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance. Fails if the target directory is missing.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting docdrop with configuration: {:#?}", config);

        let store = LocalDirectory::open(&config.target_dir, config.upload.on_conflict).await?;
        info!(
            target_dir = %store.root().display(),
            on_conflict = ?config.upload.on_conflict,
            "Uploads will be written to target directory"
        );

        let app_state = AppState::builder().config(config.clone()).store(Arc::new(store)).build();
        let router = build_router(&app_state);

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "docdrop listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

/// Resolves on the first Ctrl+C or SIGTERM. A signal whose handler can't be installed is
/// logged and never fires, so the other one still stops the server.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal_name = tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    info!(signal = signal_name, "Shutting down gracefully, finishing in-flight uploads");
}
