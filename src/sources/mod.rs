//! Import sources.
//!
//! A source hands the pipeline a sequence of [`SourceFile`]s. Two kinds exist:
//! the remote folder lister (`remote.rs`) and the local watcher agent, which
//! builds single-file sources from stabilized paths.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod credentials;
pub mod remote;

pub use credentials::{CredentialProvider, SourceCredential, StaticCredentialProvider};
pub use remote::{FolderPage, ProviderApi, ProviderClient, ProviderFile, RemoteLister};

/// File extensions accepted for import, lowercase, without the dot.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "flac", "aiff", "aif", "m4a", "als", "pdf", "txt",
];

/// MIME types accepted for import.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/mpeg",
    "audio/flac",
    "audio/x-flac",
    "audio/aiff",
    "audio/x-aiff",
    "audio/mp4",
    "audio/x-m4a",
    "application/x-ableton-live-project",
    "application/pdf",
    "text/plain",
];

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "aiff", "aif", "m4a"];

/// A file yielded by a source, not yet imported.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Source system identifier, e.g. "dropbox" or "local".
    pub provider: String,
    /// Stable identifier of the file within the provider.
    pub source_file_id: String,
    /// Original file name, used for display and for the storage key.
    pub name: String,
    pub mime_type: Option<String>,
    pub size: u64,
    /// Content revision marker: provider content hash when available,
    /// otherwise a last-modified timestamp.
    pub revision: String,
    /// Provider-specific details carried onto the registered asset.
    pub source_metadata: Option<serde_json::Value>,
    pub content: SourceContent,
}

/// Where the bytes of a [`SourceFile`] come from.
#[derive(Debug, Clone)]
pub enum SourceContent {
    /// Already on the local filesystem (watcher agent).
    LocalPath(PathBuf),
    /// Fetchable over HTTP with a bearer credential (remote lister).
    DownloadUrl { url: String, bearer: String },
}

/// Error aborting source enumeration. Unlike per-file failures this fails
/// the whole import job.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("provider request failed: {0}")]
    Provider(#[from] reqwest::Error),

    #[error("listing failed: {0}")]
    Listing(String),
}

/// Lazily yields the files of an import run, in discovery order.
///
/// The sequence is not restartable; a failed call poisons the run.
#[async_trait]
pub trait SourceEnumerator: Send {
    async fn next_file(&mut self) -> Result<Option<SourceFile>, EnumerationError>;
}

/// Enumerator over a fixed, already-materialized list of files.
///
/// Used by the watcher agent (one stabilized file per run) and by the
/// one-shot directory scan mode.
pub struct StaticEnumerator {
    files: VecDeque<SourceFile>,
}

impl StaticEnumerator {
    pub fn new(files: Vec<SourceFile>) -> Self {
        Self {
            files: files.into(),
        }
    }
}

#[async_trait]
impl SourceEnumerator for StaticEnumerator {
    async fn next_file(&mut self) -> Result<Option<SourceFile>, EnumerationError> {
        Ok(self.files.pop_front())
    }
}

/// Whether a file is eligible for import.
///
/// Accepts when EITHER the extension OR the reported MIME type is on the
/// allow-list, so files with a recognized extension but an unknown MIME type
/// (and vice versa) still pass. Dotfiles never do.
pub fn is_allowed(name: &str, mime: Option<&str>) -> bool {
    if name.starts_with('.') {
        return false;
    }
    let ext_ok = extension_of(name)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false);
    let mime_ok = mime
        .map(|m| ALLOWED_MIME_TYPES.contains(&m.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    ext_ok || mime_ok
}

/// Whether a file should go through audio metadata extraction.
pub fn is_audio(name: &str, mime: Option<&str>) -> bool {
    if let Some(m) = mime {
        if m.to_ascii_lowercase().starts_with("audio/") {
            return true;
        }
    }
    extension_of(name)
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Best-effort MIME type for a local file: extension first, then content
/// sniffing via `infer`.
pub fn mime_for_path(path: &Path) -> Option<String> {
    let by_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| mime_for_extension(&e.to_ascii_lowercase()));
    if let Some(mime) = by_ext {
        return Some(mime.to_string());
    }
    infer::get_from_path(path)
        .ok()
        .flatten()
        .map(|kind| kind.mime_type().to_string())
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "flac" => Some("audio/flac"),
        "aiff" | "aif" => Some("audio/aiff"),
        "m4a" => Some("audio/mp4"),
        "als" => Some("application/x-ableton-live-project"),
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}
