//! Remote folder listing.
//!
//! `ProviderClient` talks to the storage provider's REST API with a decrypted
//! bearer token; `RemoteLister` turns the paged folder listing into a flat
//! sequence of allow-listed [`SourceFile`]s.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{is_allowed, EnumerationError, SourceContent, SourceEnumerator, SourceFile};

const PAGE_SIZE: usize = 200;

/// One page of a provider folder listing.
#[derive(Debug, Deserialize)]
pub struct FolderPage {
    pub files: Vec<ProviderFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// A file entry as reported by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub size: u64,
    /// Content hash, when the provider computes one.
    #[serde(default)]
    pub content_hash: Option<String>,
    /// Server-side last-modified time, Unix milliseconds.
    pub modified_at: i64,
}

/// Minimal surface of the storage provider API needed for imports.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    async fn list_folder(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<FolderPage, EnumerationError>;

    /// How the pipeline should fetch the bytes of a listed file.
    fn source_content(&self, file: &ProviderFile) -> SourceContent;

    fn provider_name(&self) -> &str;
}

/// HTTP client for the storage provider's REST API.
pub struct ProviderClient {
    base_url: String,
    provider_name: String,
    token: String,
    client: Client,
}

impl ProviderClient {
    pub fn new(
        base_url: String,
        provider_name: String,
        token: String,
        timeout_sec: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            provider_name,
            token,
            client,
        }
    }
}

#[async_trait]
impl ProviderApi for ProviderClient {
    async fn list_folder(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<FolderPage, EnumerationError> {
        let url = format!(
            "{}/v1/folders/{}/files",
            self.base_url,
            urlencoding::encode(folder_id)
        );
        let mut request = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("page_size", PAGE_SIZE.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }
        let response = request.send().await?.error_for_status()?;
        let page = response.json::<FolderPage>().await?;
        Ok(page)
    }

    fn source_content(&self, file: &ProviderFile) -> SourceContent {
        SourceContent::DownloadUrl {
            url: format!(
                "{}/v1/files/{}/content",
                self.base_url,
                urlencoding::encode(&file.id)
            ),
            bearer: self.token.clone(),
        }
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }
}

/// Enumerates the direct children of one remote folder, following
/// `next_page_token` transparently until the listing is exhausted.
///
/// Pagination state lives here; a page failure aborts the run and
/// already-yielded files are not retried.
pub struct RemoteLister {
    api: Arc<dyn ProviderApi>,
    folder_id: String,
    buffer: VecDeque<ProviderFile>,
    next_page_token: Option<String>,
    exhausted: bool,
}

impl RemoteLister {
    pub fn new(api: Arc<dyn ProviderApi>, folder_id: String) -> Self {
        Self {
            api,
            folder_id,
            buffer: VecDeque::new(),
            next_page_token: None,
            exhausted: false,
        }
    }

    fn to_source_file(&self, file: ProviderFile) -> SourceFile {
        let revision = file
            .content_hash
            .clone()
            .unwrap_or_else(|| file.modified_at.to_string());
        let content = self.api.source_content(&file);
        SourceFile {
            provider: self.api.provider_name().to_string(),
            source_file_id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            size: file.size,
            revision,
            source_metadata: Some(json!({ "modified_at": file.modified_at })),
            content,
        }
    }
}

#[async_trait]
impl SourceEnumerator for RemoteLister {
    async fn next_file(&mut self) -> Result<Option<SourceFile>, EnumerationError> {
        loop {
            if let Some(file) = self.buffer.pop_front() {
                if !is_allowed(&file.name, file.mime_type.as_deref()) {
                    debug!("skipping non-importable file {}", file.name);
                    continue;
                }
                return Ok(Some(self.to_source_file(file)));
            }
            if self.exhausted {
                return Ok(None);
            }
            let page = self
                .api
                .list_folder(&self.folder_id, self.next_page_token.as_deref())
                .await?;
            self.next_page_token = page.next_page_token;
            if self.next_page_token.is_none() {
                self.exhausted = true;
            }
            self.buffer.extend(page.files);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves a scripted sequence of pages, one per `list_folder` call.
    struct ScriptedProvider {
        pages: Mutex<VecDeque<Result<FolderPage, String>>>,
    }

    impl ScriptedProvider {
        fn new(pages: Vec<Result<FolderPage, String>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
            })
        }
    }

    #[async_trait]
    impl ProviderApi for ScriptedProvider {
        async fn list_folder(
            &self,
            _folder_id: &str,
            _page_token: Option<&str>,
        ) -> Result<FolderPage, EnumerationError> {
            match self.pages.lock().unwrap().pop_front() {
                Some(Ok(page)) => Ok(page),
                Some(Err(msg)) => Err(EnumerationError::Listing(msg)),
                None => Ok(FolderPage {
                    files: vec![],
                    next_page_token: None,
                }),
            }
        }

        fn source_content(&self, file: &ProviderFile) -> SourceContent {
            SourceContent::DownloadUrl {
                url: format!("http://provider.test/files/{}", file.id),
                bearer: "token".to_string(),
            }
        }

        fn provider_name(&self) -> &str {
            "test-drive"
        }
    }

    fn entry(id: &str, name: &str, hash: Option<&str>) -> ProviderFile {
        ProviderFile {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: None,
            size: 128,
            content_hash: hash.map(|h| h.to_string()),
            modified_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_follows_pagination_across_pages() {
        let provider = ScriptedProvider::new(vec![
            Ok(FolderPage {
                files: vec![entry("f1", "a.wav", Some("h1"))],
                next_page_token: Some("p2".to_string()),
            }),
            Ok(FolderPage {
                files: vec![entry("f2", "b.mp3", Some("h2"))],
                next_page_token: None,
            }),
        ]);
        let mut lister = RemoteLister::new(provider, "folder".to_string());

        let first = lister.next_file().await.unwrap().unwrap();
        assert_eq!(first.source_file_id, "f1");
        assert_eq!(first.provider, "test-drive");
        let second = lister.next_file().await.unwrap().unwrap();
        assert_eq!(second.source_file_id, "f2");
        assert!(lister.next_file().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filters_files_outside_allow_list() {
        let provider = ScriptedProvider::new(vec![Ok(FolderPage {
            files: vec![
                entry("f1", "render.mov", None),
                entry("f2", ".DS_Store", None),
                entry("f3", "kick.wav", None),
            ],
            next_page_token: None,
        })]);
        let mut lister = RemoteLister::new(provider, "folder".to_string());

        let only = lister.next_file().await.unwrap().unwrap();
        assert_eq!(only.source_file_id, "f3");
        assert!(lister.next_file().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revision_falls_back_to_modified_time() {
        let provider = ScriptedProvider::new(vec![Ok(FolderPage {
            files: vec![entry("f1", "a.wav", None), entry("f2", "b.wav", Some("h2"))],
            next_page_token: None,
        })]);
        let mut lister = RemoteLister::new(provider, "folder".to_string());

        assert_eq!(
            lister.next_file().await.unwrap().unwrap().revision,
            "1700000000000"
        );
        assert_eq!(lister.next_file().await.unwrap().unwrap().revision, "h2");
    }

    #[tokio::test]
    async fn test_page_failure_aborts_enumeration() {
        let provider = ScriptedProvider::new(vec![
            Ok(FolderPage {
                files: vec![entry("f1", "a.wav", Some("h1"))],
                next_page_token: Some("p2".to_string()),
            }),
            Err("token expired".to_string()),
        ]);
        let mut lister = RemoteLister::new(provider, "folder".to_string());

        assert!(lister.next_file().await.unwrap().is_some());
        let err = lister.next_file().await.unwrap_err();
        assert!(err.to_string().contains("token expired"));
    }
}
