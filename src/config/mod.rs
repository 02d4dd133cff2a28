mod file_config;

pub use file_config::{FileConfig, ProviderConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub media_path: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub port: u16,
    pub api_token: Option<String>,
    pub signing_secret: Option<String>,
    pub public_base_url: Option<String>,
    pub upload_url_ttl_secs: i64,
    pub provider_url: Option<String>,
    pub provider_token: Option<String>,
    pub provider_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub media_path: PathBuf,
    pub temp_dir: PathBuf,
    pub port: u16,
    pub api_token: String,
    /// Secret signing upload URLs. Defaults to the API token so a single
    /// secret deployment works out of the box.
    pub signing_secret: String,
    pub public_base_url: String,
    pub upload_url_ttl_secs: i64,
    pub provider_url: Option<String>,
    pub provider_token: Option<String>,
    pub provider_timeout_sec: u64,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let media_path = file
            .media_path
            .map(PathBuf::from)
            .or_else(|| cli.media_path.clone())
            .unwrap_or_else(|| db_dir.join("media"));

        let temp_dir = file
            .temp_dir
            .map(PathBuf::from)
            .or_else(|| cli.temp_dir.clone())
            .unwrap_or_else(|| std::env::temp_dir().join("vault-import"));

        let port = file.port.unwrap_or(cli.port);

        let api_token = file
            .api_token
            .or_else(|| cli.api_token.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("api_token must be specified via --api-token or in config file")
            })?;
        if api_token.is_empty() {
            bail!("api_token must not be empty");
        }

        let signing_secret = file
            .signing_secret
            .or_else(|| cli.signing_secret.clone())
            .unwrap_or_else(|| api_token.clone());

        let public_base_url = file
            .public_base_url
            .or_else(|| cli.public_base_url.clone())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        let upload_url_ttl_secs = file.upload_url_ttl_secs.unwrap_or(cli.upload_url_ttl_secs);

        let provider = file.provider.unwrap_or_default();
        let provider_url = provider.url.or_else(|| cli.provider_url.clone());
        let provider_token = provider.token.or_else(|| cli.provider_token.clone());
        let provider_timeout_sec = provider.timeout_sec.unwrap_or(cli.provider_timeout_sec);

        Ok(Self {
            db_dir,
            media_path,
            temp_dir,
            port,
            api_token,
            signing_secret,
            public_base_url,
            upload_url_ttl_secs,
            provider_url,
            provider_token,
            provider_timeout_sec,
        })
    }
}
