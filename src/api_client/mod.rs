//! HTTP client for the vault server's registration contract.
//!
//! The watcher agent drives the shared import pipeline through this client:
//! it implements [`AssetCatalog`] against the lookup/version/register
//! endpoints and [`ObjectStorage`] via signed upload URLs.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::import::AssetCatalog;
use crate::storage::{ObjectStorage, SignedUpload, StorageError};
use crate::vault_store::NewVaultAsset;

// Wire types of the registration contract, shared with the server routes.

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateVersionBody {
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateVersionResponse {
    pub version_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LookupResponse {
    pub exists: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignUploadBody {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterAssetResponse {
    pub asset_id: String,
}

pub struct VaultApiClient {
    base_url: String,
    token: String,
    client: Client,
}

impl VaultApiClient {
    pub fn new(base_url: String, token: String, timeout_sec: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn sign_upload(&self, key: &str) -> Result<SignedUpload> {
        let response = self
            .client
            .post(self.url("/api/uploads/sign"))
            .bearer_auth(&self.token)
            .json(&SignUploadBody {
                key: key.to_string(),
            })
            .send()
            .await
            .context("sign-upload request failed")?;
        if response.status() != StatusCode::OK {
            bail!("sign-upload returned status {}", response.status());
        }
        Ok(response.json::<SignedUpload>().await?)
    }
}

#[async_trait]
impl AssetCatalog for VaultApiClient {
    async fn asset_exists(
        &self,
        provider: &str,
        source_file_id: &str,
        revision: &str,
    ) -> Result<bool> {
        let response = self
            .client
            .get(self.url("/api/assets/lookup"))
            .bearer_auth(&self.token)
            .query(&[
                ("provider", provider),
                ("source_file_id", source_file_id),
                ("revision", revision),
            ])
            .send()
            .await
            .context("asset lookup request failed")?;
        if response.status() != StatusCode::OK {
            bail!("asset lookup returned status {}", response.status());
        }
        Ok(response.json::<LookupResponse>().await?.exists)
    }

    async fn create_version(&self, project_id: &str, label: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url(&format!(
                "/api/projects/{}/versions",
                urlencoding::encode(project_id)
            )))
            .bearer_auth(&self.token)
            .json(&CreateVersionBody {
                label: label.to_string(),
            })
            .send()
            .await
            .context("create-version request failed")?;
        if response.status() != StatusCode::OK {
            bail!("create-version returned status {}", response.status());
        }
        Ok(response.json::<CreateVersionResponse>().await?.version_id)
    }

    async fn register_asset(&self, asset: &NewVaultAsset) -> Result<String> {
        let response = self
            .client
            .post(self.url("/api/assets"))
            .bearer_auth(&self.token)
            .json(asset)
            .send()
            .await
            .context("register-asset request failed")?;
        if response.status() != StatusCode::OK {
            bail!(
                "register-asset for {} returned status {}",
                asset.file_name,
                response.status()
            );
        }
        Ok(response.json::<RegisterAssetResponse>().await?.asset_id)
    }
}

/// Uploads go through a signed URL so the streamed PUT carries no API token.
#[async_trait]
impl ObjectStorage for VaultApiClient {
    async fn put_file(&self, key: &str, path: &Path) -> Result<u64, StorageError> {
        let signed = self
            .sign_upload(key)
            .await
            .map_err(|e| StorageError::Rejected(e.to_string()))?;

        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .client
            .put(&signed.url)
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StorageError::Rejected(format!(
                "upload returned status {}",
                response.status()
            )));
        }
        Ok(size)
    }
}
