use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vault_import_server::config::{AppConfig, CliConfig, FileConfig};
use vault_import_server::import::{
    ImportPipeline, ImportService, ImportServiceConfig, SqliteImportJobStore,
};
use vault_import_server::metadata::FfprobeMetadataProbe;
use vault_import_server::server::{run_server, ServerConfig, ServerState};
use vault_import_server::sources::StaticCredentialProvider;
use vault_import_server::storage::{LocalObjectStorage, UploadSigner};
use vault_import_server::vault_store::SqliteVaultStore;

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
    /// Directory holding the SQLite databases.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory for stored asset files. Defaults to <db_dir>/media.
    #[clap(long, value_parser = parse_path)]
    pub media_path: Option<PathBuf>,

    /// Directory for in-flight downloads.
    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// Static bearer token required on API calls.
    #[clap(long, env = "VAULT_API_TOKEN")]
    pub api_token: Option<String>,

    /// Secret for signing upload URLs. Defaults to the API token.
    #[clap(long, env = "VAULT_SIGNING_SECRET")]
    pub signing_secret: Option<String>,

    /// Externally reachable base URL, used in signed upload URLs.
    #[clap(long)]
    pub public_base_url: Option<String>,

    /// Lifetime of signed upload URLs in seconds.
    #[clap(long, default_value_t = 900)]
    pub upload_url_ttl_secs: i64,

    /// Base URL of the storage provider API for remote imports.
    #[clap(long)]
    pub provider_url: Option<String>,

    /// Decrypted access token for the storage provider.
    #[clap(long, env = "VAULT_PROVIDER_TOKEN")]
    pub provider_token: Option<String>,

    /// Timeout in seconds for provider requests.
    #[clap(long, default_value_t = 300)]
    pub provider_timeout_sec: u64,

    /// Path to an optional TOML config file. File values override CLI.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            media_path: self.media_path.clone(),
            temp_dir: self.temp_dir.clone(),
            port: self.port,
            api_token: self.api_token.clone(),
            signing_secret: self.signing_secret.clone(),
            public_base_url: self.public_base_url.clone(),
            upload_url_ttl_secs: self.upload_url_ttl_secs,
            provider_url: self.provider_url.clone(),
            provider_token: self.provider_token.clone(),
            provider_timeout_sec: self.provider_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

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

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    std::fs::create_dir_all(&config.media_path)
        .with_context(|| format!("Failed to create media directory {:?}", config.media_path))?;
    std::fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("Failed to create temp directory {:?}", config.temp_dir))?;

    info!("Opening vault database in {:?}...", config.db_dir);
    let vault_store = Arc::new(SqliteVaultStore::open(&config.db_dir.join("vault.db"))?);
    let job_store = Arc::new(SqliteImportJobStore::open(
        &config.db_dir.join("import_jobs.db"),
    )?);
    let storage = Arc::new(LocalObjectStorage::new(config.media_path.clone()));
    let signer = Arc::new(UploadSigner::new(config.signing_secret.clone()));

    let pipeline = Arc::new(ImportPipeline::new(
        vault_store.clone(),
        job_store.clone(),
        storage.clone(),
        Arc::new(FfprobeMetadataProbe),
        config.temp_dir.clone(),
    ));
    let import_service = Arc::new(ImportService::new(
        job_store.clone(),
        vault_store.clone(),
        Arc::new(StaticCredentialProvider::new(config.provider_token.clone())),
        pipeline,
        ImportServiceConfig {
            provider_url: config.provider_url.clone(),
            provider_timeout_sec: config.provider_timeout_sec,
        },
    ));

    if config.provider_url.is_none() {
        info!("No storage provider configured; remote imports are disabled");
    }

    let state = ServerState {
        config: ServerConfig {
            api_token: config.api_token.clone(),
            public_base_url: config.public_base_url.clone(),
            upload_url_ttl_ms: config.upload_url_ttl_secs * 1000,
        },
        vault_store,
        job_store,
        storage,
        signer,
        import_service,
    };

    info!("Ready to serve at port {}!", config.port);
    run_server(state, config.port).await
}
