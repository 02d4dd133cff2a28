//! The import feature: job tracking and the shared per-file pipeline driven
//! by both the remote lister and the watcher agent.

mod job_store;
mod models;
mod pipeline;
mod schema;
mod service;

pub use job_store::{ImportJobStore, SqliteImportJobStore};
pub use models::{ImportJob, ImportJobStatus, ImportSourceType};
pub use pipeline::{AssetCatalog, ImportPipeline};
pub use schema::IMPORT_SCHEMA_SQL;
pub use service::{ImportService, ImportServiceConfig};

use thiserror::Error;

use crate::sources::EnumerationError;

/// Whole-job failures. Per-file failures never surface here; they are
/// counted on the job and the run continues.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Missing credential, source folder or watch path. Raised before any
    /// file is touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The source listing could not be read; the job is marked FAILED.
    #[error("source enumeration failed: {0}")]
    Enumeration(#[from] EnumerationError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
