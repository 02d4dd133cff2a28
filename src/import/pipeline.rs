//! The shared per-file import pipeline.
//!
//! Both front-ends drive the same algorithm: dedup check, staging, metadata
//! extraction, streaming transfer, registration. The backends differ: the
//! server passes its stores directly, the watcher agent passes the HTTP
//! client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ImportError, ImportJobStore};
use crate::metadata::MetadataProbe;
use crate::sources::{is_audio, SourceContent, SourceEnumerator, SourceFile};
use crate::storage::{destination_key, sanitize_file_name, ObjectStorage};
use crate::vault_store::NewVaultAsset;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Asset registry operations the pipeline needs. Implemented by the SQLite
/// vault store (server) and by `VaultApiClient` (agent).
#[async_trait]
pub trait AssetCatalog: Send + Sync {
    /// Dedup check on the (provider, source_file_id, revision) triple.
    async fn asset_exists(
        &self,
        provider: &str,
        source_file_id: &str,
        revision: &str,
    ) -> Result<bool>;

    /// Create a project version, returning its id.
    async fn create_version(&self, project_id: &str, label: &str) -> Result<String>;

    /// Register an imported asset, returning its id.
    async fn register_asset(&self, asset: &NewVaultAsset) -> Result<String>;
}

enum FileOutcome {
    Stored { asset_id: String },
    Duplicate,
}

/// A local copy of the file being processed. Owned copies (downloads) are
/// removed when the value drops; borrowed paths (watcher files) are left
/// alone.
struct StagedFile {
    path: PathBuf,
    owned: bool,
}

impl StagedFile {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.owned {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

pub struct ImportPipeline {
    catalog: Arc<dyn AssetCatalog>,
    jobs: Arc<dyn ImportJobStore>,
    storage: Arc<dyn ObjectStorage>,
    probe: Arc<dyn MetadataProbe>,
    http: reqwest::Client,
    temp_dir: PathBuf,
}

impl ImportPipeline {
    pub fn new(
        catalog: Arc<dyn AssetCatalog>,
        jobs: Arc<dyn ImportJobStore>,
        storage: Arc<dyn ObjectStorage>,
        probe: Arc<dyn MetadataProbe>,
        temp_dir: PathBuf,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            catalog,
            jobs,
            storage,
            probe,
            http,
            temp_dir,
        }
    }

    /// Drive one import run to its terminal state.
    ///
    /// Files are processed sequentially in discovery order. The job goes
    /// RUNNING at the first yielded file and the project version is created
    /// lazily at the same point, so a failed or empty listing creates no
    /// version. Per-file failures are counted and the run continues; any
    /// whole-run error, enumeration or infrastructure, marks the job FAILED.
    pub async fn run(
        &self,
        job_id: &str,
        project_id: &str,
        version_label: &str,
        source: Box<dyn SourceEnumerator>,
    ) -> Result<(), ImportError> {
        match self.drive(job_id, project_id, version_label, source).await {
            Ok(()) => {
                info!("import job {} completed", job_id);
                Ok(())
            }
            Err(e) => {
                error!("import job {} failed: {:#}", job_id, e);
                if let Err(mark) = self.jobs.mark_failed(job_id, &e.to_string()) {
                    warn!("import job {}: could not record failure: {:#}", job_id, mark);
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        job_id: &str,
        project_id: &str,
        version_label: &str,
        mut source: Box<dyn SourceEnumerator>,
    ) -> Result<(), ImportError> {
        let mut version_id: Option<String> = None;

        loop {
            let Some(file) = source.next_file().await? else {
                break;
            };

            if version_id.is_none() {
                self.jobs.mark_running(job_id)?;
                let id = self.catalog.create_version(project_id, version_label).await?;
                debug!("import job {}: created version {}", job_id, id);
                version_id = Some(id);
            }
            let Some(version) = version_id.as_deref() else {
                break;
            };

            self.jobs.add_discovered(job_id, 1)?;

            match self.process_file(job_id, project_id, version, &file).await {
                Ok(FileOutcome::Stored { asset_id }) => {
                    info!(
                        "import job {}: imported {} as asset {}",
                        job_id, file.name, asset_id
                    );
                    self.jobs.record_processed(job_id)?;
                }
                Ok(FileOutcome::Duplicate) => {
                    debug!(
                        "import job {}: {} already imported at revision {}, skipping",
                        job_id, file.name, file.revision
                    );
                    self.jobs.record_processed(job_id)?;
                }
                Err(e) => {
                    warn!("import job {}: {} failed: {:#}", job_id, file.name, e);
                    self.jobs.record_failed(job_id)?;
                }
            }
        }

        self.jobs.mark_completed(job_id)?;
        Ok(())
    }

    async fn process_file(
        &self,
        job_id: &str,
        project_id: &str,
        version_id: &str,
        file: &SourceFile,
    ) -> Result<FileOutcome> {
        if self
            .catalog
            .asset_exists(&file.provider, &file.source_file_id, &file.revision)
            .await?
        {
            return Ok(FileOutcome::Duplicate);
        }

        let staged = self.stage(file).await?;

        let audio = if is_audio(&file.name, file.mime_type.as_deref()) {
            match self.probe.probe(staged.path()).await {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!(
                        "import job {}: metadata probe failed for {}: {}",
                        job_id, file.name, e
                    );
                    None
                }
            }
        } else {
            None
        };

        let key = destination_key(project_id, version_id, &file.source_file_id, &file.name);
        let size_bytes = self
            .storage
            .put_file(&key, staged.path())
            .await
            .with_context(|| format!("transfer of {} failed", file.name))?;

        let asset = NewVaultAsset {
            project_id: project_id.to_string(),
            version_id: version_id.to_string(),
            storage_key: key,
            file_name: file.name.clone(),
            size_bytes: size_bytes as i64,
            mime_type: file.mime_type.clone(),
            source_provider: file.provider.clone(),
            source_file_id: file.source_file_id.clone(),
            source_revision: file.revision.clone(),
            source_metadata: file.source_metadata.clone(),
            audio,
            import_job_id: Some(job_id.to_string()),
        };
        let asset_id = self.catalog.register_asset(&asset).await?;
        Ok(FileOutcome::Stored { asset_id })
    }

    /// Make the file's bytes available on the local filesystem. Watcher
    /// files already are; remote files are streamed to the temp directory.
    async fn stage(&self, file: &SourceFile) -> Result<StagedFile> {
        match &file.content {
            SourceContent::LocalPath(path) => Ok(StagedFile {
                path: path.clone(),
                owned: false,
            }),
            SourceContent::DownloadUrl { url, bearer } => {
                tokio::fs::create_dir_all(&self.temp_dir).await?;
                let dest = self
                    .temp_dir
                    .join(format!("{}-{}", Uuid::new_v4(), sanitize_file_name(&file.name)));
                let staged = StagedFile {
                    path: dest,
                    owned: true,
                };

                let response = self
                    .http
                    .get(url)
                    .bearer_auth(bearer)
                    .send()
                    .await?
                    .error_for_status()
                    .with_context(|| format!("download of {} failed", file.name))?;

                let stream = response.bytes_stream().map_err(std::io::Error::other);
                let mut reader = StreamReader::new(Box::pin(stream));
                let mut out = tokio::fs::File::create(staged.path()).await?;
                tokio::io::copy(&mut reader, &mut out).await?;
                out.flush().await?;
                Ok(staged)
            }
        }
    }
}
