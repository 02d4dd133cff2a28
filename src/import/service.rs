//! Server-side orchestration of remote imports.

use std::sync::Arc;
use tracing::{error, info};

use super::{ImportError, ImportJob, ImportJobStore, ImportPipeline, ImportSourceType};
use crate::sources::{CredentialProvider, ProviderClient, RemoteLister};
use crate::vault_store::VaultStore;

#[derive(Debug, Clone)]
pub struct ImportServiceConfig {
    /// Base URL of the storage provider API. Remote imports are refused
    /// when unset.
    pub provider_url: Option<String>,
    pub provider_timeout_sec: u64,
}

/// Validates and launches remote import jobs.
pub struct ImportService {
    jobs: Arc<dyn ImportJobStore>,
    vault_store: Arc<dyn VaultStore>,
    credentials: Arc<dyn CredentialProvider>,
    pipeline: Arc<ImportPipeline>,
    config: ImportServiceConfig,
}

impl ImportService {
    pub fn new(
        jobs: Arc<dyn ImportJobStore>,
        vault_store: Arc<dyn VaultStore>,
        credentials: Arc<dyn CredentialProvider>,
        pipeline: Arc<ImportPipeline>,
        config: ImportServiceConfig,
    ) -> Self {
        Self {
            jobs,
            vault_store,
            credentials,
            pipeline,
            config,
        }
    }

    /// Validate the project's source configuration, create a PENDING job and
    /// spawn the worker. Returns the job id immediately; progress is
    /// observed by polling the job.
    pub async fn start_remote_import(&self, project_id: &str) -> Result<String, ImportError> {
        let provider_url = self.config.provider_url.clone().ok_or_else(|| {
            ImportError::Configuration("no storage provider configured".to_string())
        })?;

        let source = self
            .vault_store
            .get_project_source(project_id)?
            .filter(|s| s.active)
            .ok_or_else(|| {
                ImportError::Configuration(format!(
                    "no active source folder configured for project {}",
                    project_id
                ))
            })?;

        let credential = self
            .credentials
            .credential_for(project_id)?
            .ok_or_else(|| {
                ImportError::Configuration(format!(
                    "no source credential available for project {}",
                    project_id
                ))
            })?;

        let job = ImportJob::new(ImportSourceType::Remote, project_id);
        self.jobs.create_job(&job)?;
        info!(
            "created import job {} for project {} (folder {})",
            job.id, project_id, source.folder_id
        );

        let api = Arc::new(ProviderClient::new(
            provider_url,
            source.provider.clone(),
            credential.access_token,
            self.config.provider_timeout_sec,
        ));
        let lister = RemoteLister::new(api, source.folder_id.clone());
        let label = format!(
            "{} import of {} at {}",
            source.provider,
            source.folder_id,
            chrono::Utc::now().format("%Y-%m-%d %H:%M")
        );

        let pipeline = self.pipeline.clone();
        let job_id = job.id.clone();
        let project = project_id.to_string();
        tokio::spawn(async move {
            // The pipeline marks the job FAILED before returning any error;
            // this boundary only keeps the task from dying silently.
            if let Err(e) = pipeline.run(&job_id, &project, &label, Box::new(lister)).await {
                error!("import job {} aborted: {:#}", job_id, e);
            }
        });

        Ok(job.id)
    }
}
