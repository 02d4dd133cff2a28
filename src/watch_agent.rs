//! Watcher agent binary.
//!
//! Runs on a workstation next to the DAW: watches one export folder and
//! pushes every stabilized file through the import pipeline, with the vault
//! server reached over HTTP for dedup, uploads and registration.

use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vault_import_server::api_client::VaultApiClient;
use vault_import_server::import::{
    ImportJob, ImportJobStore, ImportPipeline, ImportSourceType, SqliteImportJobStore,
};
use vault_import_server::metadata::FfprobeMetadataProbe;
use vault_import_server::sources::StaticEnumerator;
use vault_import_server::watcher::{source_file_for, FolderWatcher, StableFile};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory to watch for exported files.
    #[clap(long, value_parser = parse_path)]
    pub watch_path: PathBuf,

    /// Project the imported files belong to.
    #[clap(long)]
    pub project_id: String,

    /// Base URL of the vault server.
    #[clap(long)]
    pub server_url: String,

    /// API token for the vault server.
    #[clap(long, env = "VAULT_API_TOKEN")]
    pub token: String,

    /// Seconds a file must stay quiet before it is imported.
    #[clap(long, default_value_t = 2)]
    pub stability_secs: u64,

    /// Timeout in seconds for server requests, uploads included.
    #[clap(long, default_value_t = 300)]
    pub request_timeout_sec: u64,

    /// Scan the folder once, import what is there, and exit.
    #[clap(long)]
    pub once: bool,
}

struct Agent {
    pipeline: Arc<ImportPipeline>,
    jobs: Arc<SqliteImportJobStore>,
    watch_path: PathBuf,
    project_id: String,
}

impl Agent {
    /// Import one stabilized file as its own job. The [`StableFile`] guard
    /// is held until the run finishes so the watcher ignores events the
    /// import itself produces.
    async fn import_stable_file(&self, stable: StableFile) {
        let file = match source_file_for(&self.watch_path, &stable.path) {
            Ok(file) => file,
            Err(e) => {
                warn!("skipping {:?}: {:#}", stable.path, e);
                return;
            }
        };

        let job = ImportJob::new(ImportSourceType::Local, &self.project_id);
        if let Err(e) = self.jobs.create_job(&job) {
            error!("failed to create import job for {}: {:#}", file.name, e);
            return;
        }

        let label = format!(
            "Local export {} at {}",
            file.name,
            chrono::Utc::now().format("%Y-%m-%d %H:%M")
        );
        let source = Box::new(StaticEnumerator::new(vec![file]));
        if let Err(e) = self
            .pipeline
            .run(&job.id, &self.project_id, &label, source)
            .await
        {
            error!("import job {} failed: {:#}", job.id, e);
        }
        self.report(&job.id);
        drop(stable);
    }

    /// One-shot mode: everything currently in the folder becomes a single
    /// import run.
    async fn import_folder_once(&self) -> Result<()> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.watch_path)
            .await
            .with_context(|| format!("failed to read {:?}", self.watch_path))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if !vault_import_server::sources::is_allowed(&name, None) {
                continue;
            }
            files.push(source_file_for(&self.watch_path, &path)?);
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        info!("found {} importable files in {:?}", files.len(), self.watch_path);

        let job = ImportJob::new(ImportSourceType::Local, &self.project_id);
        self.jobs.create_job(&job)?;
        let label = format!(
            "Folder scan at {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M")
        );
        self.pipeline
            .run(
                &job.id,
                &self.project_id,
                &label,
                Box::new(StaticEnumerator::new(files)),
            )
            .await?;
        self.report(&job.id);
        Ok(())
    }

    fn report(&self, job_id: &str) {
        match self.jobs.get_job(job_id) {
            Ok(Some(job)) => info!(
                "import job {} {}: {} processed, {} failed",
                job.id,
                job.status.as_str(),
                job.processed_files,
                job.failed_files
            ),
            Ok(None) => warn!("import job {} vanished", job_id),
            Err(e) => warn!("failed to read import job {}: {:#}", job_id, e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let client = Arc::new(VaultApiClient::new(
        args.server_url.clone(),
        args.token.clone(),
        args.request_timeout_sec,
    ));
    // Agent-side job tracking is ephemeral; the registry of record lives on
    // the server.
    let jobs = Arc::new(SqliteImportJobStore::in_memory()?);
    let pipeline = Arc::new(ImportPipeline::new(
        client.clone(),
        jobs.clone(),
        client,
        Arc::new(FfprobeMetadataProbe),
        std::env::temp_dir().join("vault-watch"),
    ));
    let agent = Arc::new(Agent {
        pipeline,
        jobs,
        watch_path: args.watch_path.clone(),
        project_id: args.project_id.clone(),
    });

    if args.once {
        return agent.import_folder_once().await;
    }

    let window = Duration::from_secs(args.stability_secs.max(1));
    let (watcher, mut rx) = FolderWatcher::start(&args.watch_path, window)?;
    info!(
        "importing exports from {:?} into project {}",
        args.watch_path, args.project_id
    );

    watch_loop(agent, watcher, rx, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;
    Ok(())
}

/// Dispatch stabilized files to import tasks until `shutdown` resolves or
/// the watcher channel closes. Imports already in flight are joined before
/// returning so a shutdown never abandons a half-finished upload.
async fn watch_loop(
    agent: Arc<Agent>,
    watcher: FolderWatcher,
    mut rx: mpsc::UnboundedReceiver<StableFile>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    let mut imports = JoinSet::new();
    loop {
        tokio::select! {
            stable = rx.recv() => {
                match stable {
                    Some(stable) => {
                        let agent = agent.clone();
                        imports.spawn(async move {
                            agent.import_stable_file(stable).await;
                        });
                    }
                    None => break,
                }
            }
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
    }
    watcher.stop();
    if !imports.is_empty() {
        info!("waiting for {} in-flight imports", imports.len());
    }
    while imports.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use vault_import_server::import::ImportJobStatus;
    use vault_import_server::storage::{LocalObjectStorage, ObjectStorage, StorageError};
    use vault_import_server::vault_store::{SqliteVaultStore, VaultStore};

    /// Storage wrapper that keeps each upload in flight long enough for a
    /// shutdown to race it.
    struct SlowStorage {
        inner: LocalObjectStorage,
    }

    #[async_trait]
    impl ObjectStorage for SlowStorage {
        async fn put_file(&self, key: &str, path: &Path) -> Result<u64, StorageError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.inner.put_file(key, path).await
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_waits_for_in_flight_import() {
        let dir = tempfile::tempdir().unwrap();
        let watch_path = dir.path().join("exports");
        std::fs::create_dir_all(&watch_path).unwrap();

        let vault = Arc::new(SqliteVaultStore::in_memory().unwrap());
        let jobs = Arc::new(SqliteImportJobStore::in_memory().unwrap());
        let pipeline = Arc::new(ImportPipeline::new(
            vault.clone(),
            jobs.clone(),
            Arc::new(SlowStorage {
                inner: LocalObjectStorage::new(dir.path().join("media")),
            }),
            Arc::new(FfprobeMetadataProbe),
            dir.path().join("tmp"),
        ));
        let agent = Arc::new(Agent {
            pipeline,
            jobs: jobs.clone(),
            watch_path: watch_path.clone(),
            project_id: "p1".to_string(),
        });

        let (watcher, rx) =
            FolderWatcher::start(&watch_path, Duration::from_millis(100)).unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let loop_task = tokio::spawn(watch_loop(agent, watcher, rx, async {
            let _ = shutdown_rx.await;
        }));

        std::fs::write(watch_path.join("notes.txt"), b"session notes").unwrap();

        // Wait until the import has started, then shut down while its slow
        // upload is still in flight.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if !jobs.jobs_for_project("p1", 1).unwrap().is_empty() {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "import never started");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        shutdown_tx.send(()).unwrap();
        loop_task.await.unwrap();

        let job = &jobs.jobs_for_project("p1", 1).unwrap()[0];
        assert_eq!(job.status, ImportJobStatus::Completed);
        assert_eq!(job.processed_files, 1);
        assert_eq!(vault.assets_for_job(&job.id).unwrap().len(), 1);
    }
}
