//! Source credentials.
//!
//! Tokens arrive here already decrypted; encryption, rotation and the OAuth
//! dance belong to the connection service that fronts this trait.

use anyhow::Result;

/// A decrypted credential for a provider connection.
#[derive(Debug, Clone)]
pub struct SourceCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix milliseconds, when the provider reports token expiry.
    pub expires_at: Option<i64>,
}

/// Resolves the credential backing a project's source connection.
/// `None` means no usable connection and the import must not start.
pub trait CredentialProvider: Send + Sync {
    fn credential_for(&self, project_id: &str) -> Result<Option<SourceCredential>>;
}

/// Credential provider backed by a single deployment-level token, the way a
/// self-hosted install configures its one drive connection.
pub struct StaticCredentialProvider {
    credential: Option<SourceCredential>,
}

impl StaticCredentialProvider {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            credential: access_token.map(|token| SourceCredential {
                access_token: token,
                refresh_token: None,
                expires_at: None,
            }),
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn credential_for(&self, _project_id: &str) -> Result<Option<SourceCredential>> {
        Ok(self.credential.clone())
    }
}
