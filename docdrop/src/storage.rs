//! Target directory storage.
//!
//! Uploads are streamed into a hidden staging file inside the target directory and only
//! published under their real name once every byte is on disk, so a consumer watching the
//! directory never picks up a half-written file.

use crate::config::ConflictPolicy;
use crate::errors::{Error, Result};
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Upload content as it arrives off the wire
pub type ByteStream<'a> = BoxStream<'a, Result<Bytes>>;

const STAGING_SUFFIX: &str = "docdrop-partial";

/// Upload content that is fully on disk but not yet visible under its final name
#[derive(Debug)]
pub struct StagedFile {
    pub filename: String,
    pub staging: PathBuf,
    pub destination: PathBuf,
    pub bytes: u64,
}

/// A file that has been written and published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Trait for upload storage backends.
///
/// Writing is split in two so callers can hold a complete upload back until the rest of the
/// request has been read, and throw it away if that fails.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write `content` to a hidden location, ready to be published under `filename`
    async fn stage(&self, filename: &str, content: ByteStream<'_>) -> Result<StagedFile>;

    /// Make a staged upload visible under its final name
    async fn publish(&self, staged: StagedFile) -> Result<SavedFile>;

    /// Drop a staged upload without publishing it
    async fn discard(&self, staged: StagedFile);

    /// Stage and immediately publish
    async fn save(&self, filename: &str, content: ByteStream<'_>) -> Result<SavedFile> {
        let staged = self.stage(filename, content).await?;
        self.publish(staged).await
    }
}

/// Check that a client-supplied filename names a file directly inside the target directory.
///
/// Only a single plain path component is accepted: no separators of either flavour, no `.` or
/// `..`, no NUL bytes.
pub fn validate_filename(filename: &str) -> Result<&str> {
    if filename.is_empty() {
        return Err(Error::NoSelectedFile);
    }

    let invalid = || Error::InvalidFilename {
        filename: filename.to_string(),
    };

    if filename.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(filename),
        _ => Err(invalid()),
    }
}

async fn remove_staging(staging: &Path) {
    if let Err(e) = fs::remove_file(staging).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!(staging = %staging.display(), error = %e, "Failed to remove staging file");
    }
}

/// Local filesystem storage backend - writes into one pre-existing directory
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
    on_conflict: ConflictPolicy,
}

impl LocalDirectory {
    /// Use `root` as the target directory. It is not created here.
    pub fn new(root: impl Into<PathBuf>, on_conflict: ConflictPolicy) -> Self {
        Self {
            root: root.into(),
            on_conflict,
        }
    }

    /// Like [`LocalDirectory::new`], but fails unless `root` exists and is a directory.
    pub async fn open(root: impl Into<PathBuf>, on_conflict: ConflictPolicy) -> anyhow::Result<Self> {
        let root = root.into();
        let metadata = fs::metadata(&root)
            .await
            .with_context(|| format!("target directory {} is not accessible", root.display()))?;
        anyhow::ensure!(metadata.is_dir(), "target directory {} is not a directory", root.display());
        Ok(Self::new(root, on_conflict))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging_path(&self) -> PathBuf {
        self.root.join(format!(".{}.{}", uuid::Uuid::new_v4(), STAGING_SUFFIX))
    }

    async fn write_staged(&self, staging: &Path, mut content: ByteStream<'_>) -> Result<u64> {
        let mut file = fs::OpenOptions::new().write(true).create_new(true).open(staging).await?;
        let mut written = 0u64;

        while let Some(chunk) = content.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    async fn link_into_place(&self, staged: &StagedFile) -> Result<()> {
        match self.on_conflict {
            ConflictPolicy::Overwrite => {
                fs::rename(&staged.staging, &staged.destination).await?;
            }
            ConflictPolicy::Reject => {
                // link() refuses to replace an existing entry
                match fs::hard_link(&staged.staging, &staged.destination).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        return Err(Error::Conflict {
                            filename: staged.filename.clone(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
                // The upload is already published at this point; a leftover staging link is
                // only clutter
                remove_staging(&staged.staging).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for LocalDirectory {
    #[instrument(skip(self, content), fields(target_dir = %self.root.display()))]
    async fn stage(&self, filename: &str, content: ByteStream<'_>) -> Result<StagedFile> {
        let filename = validate_filename(filename)?;
        let destination = self.root.join(filename);

        if self.on_conflict == ConflictPolicy::Reject && fs::try_exists(&destination).await? {
            return Err(Error::Conflict {
                filename: filename.to_string(),
            });
        }

        let staging = self.staging_path();
        debug!(staging = %staging.display(), "Streaming upload to staging file");

        match self.write_staged(&staging, content).await {
            Ok(bytes) => Ok(StagedFile {
                filename: filename.to_string(),
                staging,
                destination,
                bytes,
            }),
            Err(e) => {
                remove_staging(&staging).await;
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(destination = %staged.destination.display()))]
    async fn publish(&self, staged: StagedFile) -> Result<SavedFile> {
        if let Err(e) = self.link_into_place(&staged).await {
            remove_staging(&staged.staging).await;
            return Err(e);
        }

        Ok(SavedFile {
            path: staged.destination,
            bytes: staged.bytes,
        })
    }

    async fn discard(&self, staged: StagedFile) {
        debug!(staging = %staged.staging.display(), "Discarding staged upload");
        remove_staging(&staged.staging).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::dir_entries;
    use futures::stream;

    fn content(chunks: &[&'static [u8]]) -> ByteStream<'static> {
        let chunks: Vec<Result<Bytes>> = chunks.iter().map(|c| Ok(Bytes::from_static(*c))).collect();
        stream::iter(chunks).boxed()
    }

    #[test]
    fn test_validate_filename_accepts_plain_names() {
        for name in ["report.pdf", "scan 2024-01-01.tiff", ".hidden", "no_extension", "ünïcødé.txt", "..."] {
            assert_eq!(validate_filename(name).unwrap(), name);
        }
    }

    #[test]
    fn test_validate_filename_empty_is_no_selected_file() {
        assert!(matches!(validate_filename(""), Err(Error::NoSelectedFile)));
    }

    #[test]
    fn test_validate_filename_rejects_traversal_and_separators() {
        for name in ["../escape.txt", "..", ".", "a/b.txt", "/etc/passwd", "..\\escape.txt", "dir\\file", "nul\0byte"] {
            assert!(
                matches!(validate_filename(name), Err(Error::InvalidFilename { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_save_writes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectory::new(dir.path(), ConflictPolicy::Overwrite);

        let saved = store.save("report.pdf", content(&[b"%PDF-1.4", b"\n", b"%%EOF"])).await.unwrap();

        assert_eq!(saved.path, dir.path().join("report.pdf"));
        assert_eq!(saved.bytes, 14);
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"%PDF-1.4\n%%EOF");
        assert_eq!(dir_entries(dir.path()), vec!["report.pdf"]);
    }

    #[tokio::test]
    async fn test_save_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectory::new(dir.path(), ConflictPolicy::Overwrite);

        let saved = store.save("empty.txt", content(&[])).await.unwrap();

        assert_eq!(saved.bytes, 0);
        assert!(std::fs::read(&saved.path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectory::new(dir.path(), ConflictPolicy::Overwrite);

        store.save("notes.txt", content(&[b"first version, longer"])).await.unwrap();
        store.save("notes.txt", content(&[b"second"])).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("notes.txt")).unwrap(), b"second");
        assert_eq!(dir_entries(dir.path()), vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn test_reject_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectory::new(dir.path(), ConflictPolicy::Reject);

        store.save("notes.txt", content(&[b"original"])).await.unwrap();
        let result = store.save("notes.txt", content(&[b"replacement"])).await;

        assert!(matches!(result, Err(Error::Conflict { .. })));
        assert_eq!(std::fs::read(dir.path().join("notes.txt")).unwrap(), b"original");
        assert_eq!(dir_entries(dir.path()), vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn test_reject_publishes_new_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectory::new(dir.path(), ConflictPolicy::Reject);

        let saved = store.save("fresh.txt", content(&[b"hello"])).await.unwrap();

        assert_eq!(std::fs::read(saved.path).unwrap(), b"hello");
        assert_eq!(dir_entries(dir.path()), vec!["fresh.txt"]);
    }

    #[tokio::test]
    async fn test_traversal_writes_nothing() {
        let outer = tempfile::tempdir().unwrap();
        let target = outer.path().join("consume");
        std::fs::create_dir(&target).unwrap();
        let store = LocalDirectory::new(&target, ConflictPolicy::Overwrite);

        let result = store.save("../escape.txt", content(&[b"gotcha"])).await;

        assert!(matches!(result, Err(Error::InvalidFilename { .. })));
        assert!(!outer.path().join("escape.txt").exists());
        assert!(dir_entries(&target).is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectory::new(dir.path(), ConflictPolicy::Overwrite);

        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(Error::BadRequest {
                message: "connection reset".to_string(),
            }),
        ])
        .boxed();

        let result = store.save("broken.bin", failing).await;

        assert!(matches!(result, Err(Error::BadRequest { .. })));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_staged_file_invisible_until_published() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectory::new(dir.path(), ConflictPolicy::Overwrite);

        let staged = store.stage("scan.tiff", content(&[b"II*\0"])).await.unwrap();
        assert!(!dir.path().join("scan.tiff").exists());
        assert!(staged.staging.exists());

        let saved = store.publish(staged).await.unwrap();
        assert_eq!(saved.bytes, 4);
        assert_eq!(dir_entries(dir.path()), vec!["scan.tiff"]);
    }

    #[tokio::test]
    async fn test_discard_removes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectory::new(dir.path(), ConflictPolicy::Reject);

        let staged = store.stage("scan.tiff", content(&[b"data"])).await.unwrap();
        store.discard(staged).await;

        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be replaced by a file, whatever the permissions
        std::fs::create_dir(dir.path().join("occupied")).unwrap();
        std::fs::write(dir.path().join("occupied").join("keep.txt"), b"x").unwrap();
        let store = LocalDirectory::new(dir.path(), ConflictPolicy::Overwrite);

        let result = store.save("occupied", content(&[b"data"])).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(dir_entries(dir.path()), vec!["occupied"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_staging_cleanup_failure_only_warns() {
        let dir = tempfile::tempdir().unwrap();
        // remove_file() can't delete a directory, so cleanup fails without panicking or erroring
        let stuck = dir.path().join(".stuck.docdrop-partial");
        std::fs::create_dir(&stuck).unwrap();

        remove_staging(&stuck).await;
        remove_staging(&dir.path().join(".gone.docdrop-partial")).await;

        assert!(stuck.is_dir());
    }

    #[tokio::test]
    async fn test_open_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();

        assert!(LocalDirectory::open(dir.path(), ConflictPolicy::Overwrite).await.is_ok());
        assert!(LocalDirectory::open(dir.path().join("missing"), ConflictPolicy::Overwrite).await.is_err());

        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"x").unwrap();
        let err = LocalDirectory::open(&file, ConflictPolicy::Overwrite).await.unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
