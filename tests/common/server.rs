//! Test server lifecycle management
//!
//! Each test gets its own vault server on a random port, with in-memory
//! SQLite stores and a throwaway media directory. Dropping the server shuts
//! it down and removes the temp resources.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use vault_import_server::import::{
    ImportPipeline, ImportService, ImportServiceConfig, SqliteImportJobStore,
};
use vault_import_server::metadata::FfprobeMetadataProbe;
use vault_import_server::server::state::ServerState;
use vault_import_server::server::{make_router, ServerConfig};
use vault_import_server::sources::StaticCredentialProvider;
use vault_import_server::storage::{LocalObjectStorage, UploadSigner};
use vault_import_server::vault_store::SqliteVaultStore;

use super::TEST_TOKEN;

const SERVER_READY_TIMEOUT_MS: u64 = 5000;
const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Direct store handles for assertions.
    pub vault_store: Arc<SqliteVaultStore>,
    pub job_store: Arc<SqliteImportJobStore>,

    /// Where uploaded files land.
    pub media_dir: PathBuf,

    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawn a server with no remote provider configured.
    pub async fn spawn() -> Self {
        Self::spawn_with_provider(None).await
    }

    /// Spawn a server whose import service talks to the given provider URL.
    pub async fn spawn_with_provider(provider_url: Option<&str>) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let media_dir = temp_dir.path().join("media");

        let vault_store =
            Arc::new(SqliteVaultStore::in_memory().expect("Failed to open vault store"));
        let job_store =
            Arc::new(SqliteImportJobStore::in_memory().expect("Failed to open job store"));
        let storage = Arc::new(LocalObjectStorage::new(media_dir.clone()));
        let signer = Arc::new(UploadSigner::new(TEST_TOKEN.to_string()));

        let pipeline = Arc::new(ImportPipeline::new(
            vault_store.clone(),
            job_store.clone(),
            storage.clone(),
            Arc::new(FfprobeMetadataProbe),
            temp_dir.path().join("tmp"),
        ));
        let import_service = Arc::new(ImportService::new(
            job_store.clone(),
            vault_store.clone(),
            Arc::new(StaticCredentialProvider::new(Some(
                "provider-token".to_string(),
            ))),
            pipeline,
            ImportServiceConfig {
                provider_url: provider_url.map(String::from),
                provider_timeout_sec: 5,
            },
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = ServerState {
            config: ServerConfig {
                api_token: TEST_TOKEN.to_string(),
                public_base_url: base_url.clone(),
                upload_url_ttl_ms: 60_000,
            },
            vault_store: vault_store.clone(),
            job_store: job_store.clone(),
            storage,
            signer,
            import_service,
        };
        let app = make_router(state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            vault_store,
            job_store,
            media_dir,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    /// Polls /health until the server answers.
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);
        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }
            match client
                .get(format!("{}/health", self.base_url))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
