use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub media_path: Option<String>,
    pub temp_dir: Option<String>,
    pub port: Option<u16>,
    pub api_token: Option<String>,
    pub signing_secret: Option<String>,
    pub public_base_url: Option<String>,
    pub upload_url_ttl_secs: Option<i64>,

    // Remote source provider
    pub provider: Option<ProviderConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_sec: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
