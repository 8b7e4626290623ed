//! Test utilities for building configs and servers over a temporary target directory.

use crate::config::{ConflictPolicy, Config, UploadConfig};
use crate::storage::LocalDirectory;
use crate::{AppState, build_router};
use axum_test::TestServer;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub fn create_test_config(target_dir: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        target_dir: target_dir.to_path_buf(),
        upload: UploadConfig::default(),
        enable_otel_export: false,
    }
}

pub async fn create_test_server_with_config(config: Config) -> TestServer {
    let store = LocalDirectory::open(&config.target_dir, config.upload.on_conflict)
        .await
        .expect("Failed to open target directory");
    let state = AppState::builder().config(config).store(Arc::new(store)).build();

    TestServer::new(build_router(&state)).expect("Failed to create test server")
}

pub async fn create_test_server_in(target_dir: &Path, on_conflict: ConflictPolicy) -> TestServer {
    let mut config = create_test_config(target_dir);
    config.upload.on_conflict = on_conflict;
    create_test_server_with_config(config).await
}

/// Server over a fresh temporary directory. Keep the `TempDir` alive for the test's duration.
pub async fn create_test_server(on_conflict: ConflictPolicy) -> (TestServer, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let server = create_test_server_in(dir.path(), on_conflict).await;
    (server, dir)
}

/// Sorted names of everything in `dir`, staging files included
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read dir")
        .map(|entry| entry.expect("Failed to read dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
