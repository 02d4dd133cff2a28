//! Asset object storage.
//!
//! Destination keys are `{project}/{version}/{source_file_id}-{name}`, every
//! segment sanitized. `LocalObjectStorage` maps keys to paths under the media
//! root; the watcher agent uploads through signed URLs instead (see
//! `api_client`).

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::{ReaderStream, StreamReader};

mod signer;
pub use signer::{SignedUpload, UploadSigner};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload rejected: {0}")]
    Rejected(String),
}

/// Writes asset bytes to their destination. Implementations must stream;
/// file contents are never buffered whole.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store the file at `path` under `key`. Returns the number of bytes
    /// written.
    async fn put_file(&self, key: &str, path: &Path) -> Result<u64, StorageError>;
}

/// Object storage on the local filesystem under a media root.
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a key to its path under the media root, rejecting keys that
    /// would escape it.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StorageError::InvalidKey(key.to_string()));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Stream a body into the file for `key`. Written to a `.part` file
    /// first so a failed transfer never leaves a readable destination.
    pub async fn put_stream<S>(&self, key: &str, stream: S) -> Result<u64, StorageError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send,
    {
        let dest = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let partial = dest.with_extension("part");

        let mut reader = StreamReader::new(Box::pin(stream));
        let mut out = fs::File::create(&partial).await?;
        let written = match tokio::io::copy(&mut reader, &mut out).await {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e.into());
            }
        };
        out.flush().await?;
        drop(out);
        fs::rename(&partial, &dest).await?;
        Ok(written)
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put_file(&self, key: &str, path: &Path) -> Result<u64, StorageError> {
        let file = fs::File::open(path).await?;
        self.put_stream(key, ReaderStream::new(file)).await
    }
}

/// Build the destination key for an asset.
pub fn destination_key(
    project_id: &str,
    version_id: &str,
    source_file_id: &str,
    file_name: &str,
) -> String {
    format!(
        "{}/{}/{}-{}",
        sanitize_segment(project_id),
        sanitize_segment(version_id),
        sanitize_segment(source_file_id),
        sanitize_file_name(file_name)
    )
}

/// Replace everything outside `[A-Za-z0-9._-]` with underscores and strip
/// leading/trailing dots, so a key segment can never traverse directories.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

fn sanitize_segment(segment: &str) -> String {
    sanitize_file_name(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("kick.wav"), "kick.wav");
        assert_eq!(sanitize_file_name("Mix Final (v2).wav"), "Mix_Final__v2_.wav");
        // Slashes become underscores, then leading dots are trimmed
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("..."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn test_destination_key() {
        let key = destination_key("proj1", "v1", "exports/kick.wav", "kick.wav");
        assert_eq!(key, "proj1/v1/exports_kick.wav-kick.wav");
        // Path separators in any component never create extra segments
        assert_eq!(key.split('/').count(), 3);
    }

    #[test]
    fn test_path_for_rejects_traversal() {
        let storage = LocalObjectStorage::new(PathBuf::from("/srv/media"));
        assert!(storage.path_for("p/v/file.wav").is_ok());
        assert!(matches!(
            storage.path_for("p/../file.wav"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.path_for("p//file.wav"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(storage.path_for(""), Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_put_file_streams_to_destination() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path().join("media"));

        let src = dir.path().join("src.wav");
        tokio::fs::write(&src, b"audio-bytes").await.unwrap();

        let written = storage.put_file("p/v/src.wav", &src).await.unwrap();
        assert_eq!(written, 11);

        let stored = tokio::fs::read(dir.path().join("media/p/v/src.wav"))
            .await
            .unwrap();
        assert_eq!(stored, b"audio-bytes");
    }

    #[tokio::test]
    async fn test_put_stream_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path().to_path_buf());

        let body = |bytes: &'static [u8]| {
            futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(bytes))])
        };
        storage.put_stream("p/v/a.txt", body(b"one")).await.unwrap();
        storage.put_stream("p/v/a.txt", body(b"two")).await.unwrap();

        let stored = tokio::fs::read(dir.path().join("p/v/a.txt")).await.unwrap();
        assert_eq!(stored, b"two");
    }
}
