//! Time-limited signed upload URLs.
//!
//! The server issues `PUT /api/uploads/{key}?expires=..&sig=..` URLs and
//! verifies them with the shared signing secret; the agent uploads stabilized
//! files through them without holding the API token in the URL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A signed upload destination handed to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUpload {
    pub url: String,
    pub key: String,
    /// Unix milliseconds after which the URL is rejected.
    pub expires_at: i64,
}

pub struct UploadSigner {
    secret: String,
}

impl UploadSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign `key` for an upload expiring `ttl_ms` from now.
    pub fn sign(&self, base_url: &str, key: &str, ttl_ms: i64) -> SignedUpload {
        let expires_at = chrono::Utc::now().timestamp_millis() + ttl_ms;
        let sig = self.signature(key, expires_at);
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let url = format!(
            "{}/api/uploads/{}?expires={}&sig={}",
            base_url.trim_end_matches('/'),
            encoded_key,
            expires_at,
            sig
        );
        SignedUpload {
            url,
            key: key.to_string(),
            expires_at,
        }
    }

    /// Check signature and expiry for an incoming upload.
    pub fn verify(&self, key: &str, expires_at: i64, sig: &str) -> bool {
        if expires_at < chrono::Utc::now().timestamp_millis() {
            return false;
        }
        let expected = self.signature(key, expires_at);
        // Byte-wise accumulation instead of an early-exit compare
        let (a, b) = (expected.as_bytes(), sig.as_bytes());
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }

    fn signature(&self, key: &str, expires_at: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires_at.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.secret.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}
