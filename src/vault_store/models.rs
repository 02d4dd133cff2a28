//! Data models for the vault store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::AudioMetadata;

/// A grouping checkpoint inside a project. Imported assets always attach to
/// one: remote runs create one per run, the watcher one per stabilized
/// export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectVersion {
    pub id: String,
    pub project_id: String,
    /// Human-readable description of where the version came from.
    pub label: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl ProjectVersion {
    pub fn new(project_id: &str, label: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            label: label.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// An asset registration request, as produced by the pipeline and accepted
/// by `POST /api/assets`. The store assigns id and created_at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVaultAsset {
    pub project_id: String,
    pub version_id: String,
    pub storage_key: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    pub source_provider: String,
    pub source_file_id: String,
    pub source_revision: String,
    #[serde(default)]
    pub source_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub audio: Option<AudioMetadata>,
    #[serde(default)]
    pub import_job_id: Option<String>,
}

/// A registered asset. Insert-once; the pipeline never updates assets, a
/// changed source revision registers a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultAsset {
    pub id: String,
    pub project_id: String,
    pub version_id: String,
    pub storage_key: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,

    // Provenance; (source_provider, source_file_id, source_revision) is the
    // dedup key and unique in the store.
    pub source_provider: String,
    pub source_file_id: String,
    pub source_revision: String,
    pub source_metadata: Option<serde_json::Value>,

    pub audio: Option<AudioMetadata>,

    pub import_job_id: Option<String>,
    pub created_at: i64,
}

impl VaultAsset {
    pub fn from_new(new: NewVaultAsset) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: new.project_id,
            version_id: new.version_id,
            storage_key: new.storage_key,
            file_name: new.file_name,
            size_bytes: new.size_bytes,
            mime_type: new.mime_type,
            source_provider: new.source_provider,
            source_file_id: new.source_file_id,
            source_revision: new.source_revision,
            source_metadata: new.source_metadata,
            audio: new.audio,
            import_job_id: new.import_job_id,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Per-project remote source configuration. Starting a remote import
/// requires an active row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSource {
    pub project_id: String,
    pub provider: String,
    pub folder_id: String,
    pub active: bool,
}
