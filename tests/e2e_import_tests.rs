//! End-to-end tests for imports: the job control routes and the watcher
//! agent path, which drives the shared pipeline against the server over
//! HTTP.

mod common;

use common::{TestServer, TEST_TOKEN};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use vault_import_server::api_client::VaultApiClient;
use vault_import_server::import::{
    ImportJob, ImportJobStatus, ImportJobStore, ImportPipeline, ImportSourceType,
    SqliteImportJobStore,
};
use vault_import_server::metadata::{AudioMetadata, ExtractError, MetadataProbe};
use vault_import_server::sources::{SourceFile, StaticEnumerator};
use vault_import_server::vault_store::VaultStore;
use vault_import_server::watcher::source_file_for;

struct StubProbe;

#[async_trait]
impl MetadataProbe for StubProbe {
    async fn probe(&self, _path: &Path) -> Result<AudioMetadata, ExtractError> {
        Ok(AudioMetadata {
            duration_ms: 2500,
            sample_rate: Some(48000),
            bit_rate: Some(1411),
            channels: Some(2),
            format: "wav".to_string(),
        })
    }
}

/// An agent wired to a test server: the HTTP client is both the catalog and
/// the storage backend.
struct TestAgent {
    pipeline: ImportPipeline,
    jobs: Arc<SqliteImportJobStore>,
    dir: tempfile::TempDir,
}

fn make_agent(server: &TestServer) -> TestAgent {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(VaultApiClient::new(
        server.base_url.clone(),
        TEST_TOKEN.to_string(),
        10,
    ));
    let jobs = Arc::new(SqliteImportJobStore::in_memory().unwrap());
    let pipeline = ImportPipeline::new(
        client.clone(),
        jobs.clone(),
        client,
        Arc::new(StubProbe),
        dir.path().join("tmp"),
    );
    TestAgent {
        pipeline,
        jobs,
        dir,
    }
}

impl TestAgent {
    fn export(&self, name: &str, content: &str) -> SourceFile {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        source_file_for(self.dir.path(), &path).unwrap()
    }

    async fn run(&self, files: Vec<SourceFile>) -> ImportJob {
        let job = ImportJob::new(ImportSourceType::Local, "p1");
        self.jobs.create_job(&job).unwrap();
        self.pipeline
            .run(&job.id, "p1", "agent run", Box::new(StaticEnumerator::new(files)))
            .await
            .unwrap();
        self.jobs.get_job(&job.id).unwrap().unwrap()
    }
}

// =============================================================================
// Agent-driven imports over HTTP
// =============================================================================

#[tokio::test]
async fn test_agent_imports_new_files_and_skips_known_ones() {
    let server = TestServer::spawn().await;
    let agent = make_agent(&server);

    // One file is already in the vault from an earlier run
    let known = agent.export("loop.mp3", "mp3-bytes");
    agent.run(vec![known.clone()]).await;

    let files = vec![
        agent.export("kick.wav", "wav-bytes"),
        known,
        agent.export("cover.pdf", "pdf-bytes"),
    ];
    let job = agent.run(files).await;

    assert_eq!(job.status, ImportJobStatus::Completed);
    assert_eq!(job.total_files, 3);
    assert_eq!(job.processed_files, 3);
    assert_eq!(job.failed_files, 0);

    // Only the two unknown files became assets
    let assets = server.vault_store.assets_for_job(&job.id).unwrap();
    assert_eq!(assets.len(), 2);
    let names: Vec<&str> = assets.iter().map(|a| a.file_name.as_str()).collect();
    assert!(names.contains(&"kick.wav"));
    assert!(names.contains(&"cover.pdf"));
}

#[tokio::test]
async fn test_agent_upload_lands_byte_identical() {
    let server = TestServer::spawn().await;
    let agent = make_agent(&server);

    let job = agent
        .run(vec![agent.export("bounce.wav", "these exact bytes")])
        .await;
    assert_eq!(job.status, ImportJobStatus::Completed);

    let assets = server.vault_store.assets_for_job(&job.id).unwrap();
    assert_eq!(assets.len(), 1);
    let stored = std::fs::read(server.media_dir.join(&assets[0].storage_key)).unwrap();
    assert_eq!(stored, b"these exact bytes");
    assert_eq!(assets[0].size_bytes, stored.len() as i64);
    // The stub probe metadata travelled through registration
    assert_eq!(assets[0].audio.as_ref().unwrap().duration_ms, 2500);
}

#[tokio::test]
async fn test_rewritten_export_imports_again() {
    let server = TestServer::spawn().await;
    let agent = make_agent(&server);

    let first = agent.export("mix.wav", "take one");
    agent.run(vec![first.clone()]).await;

    // Same path, new mtime revision
    let mut second = agent.export("mix.wav", "take two");
    if second.revision == first.revision {
        second.revision = format!("{}1", second.revision);
    }
    let job = agent.run(vec![second]).await;

    assert_eq!(job.processed_files, 1);
    assert_eq!(server.vault_store.assets_for_job(&job.id).unwrap().len(), 1);
}

// =============================================================================
// Import control routes
// =============================================================================

#[tokio::test]
async fn test_start_without_provider_is_a_conflict() {
    let server = TestServer::spawn().await;
    let response = reqwest::Client::new()
        .post(format!("{}/api/import/start", server.base_url))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({ "project_id": "p1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let server = TestServer::spawn().await;
    let response = reqwest::Client::new()
        .get(format!("{}/api/import/jobs/nope", server.base_url))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreachable_provider_fails_the_job() {
    // Port 1 is never listening; enumeration fails on the first page
    let server = TestServer::spawn_with_provider(Some("http://127.0.0.1:1")).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/api/projects/p1/source", server.base_url))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({ "provider": "dropbox", "folder_id": "folder-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = http
        .post(format!("{}/api/import/start", server.base_url))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({ "project_id": "p1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = response.json::<serde_json::Value>().await.unwrap()["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let job = poll_until_terminal(&server, &job_id).await;
    assert_eq!(job.status, ImportJobStatus::Failed);
    assert!(job.error_message.is_some());

    // The job shows up in the project listing
    let listed = http
        .get(format!("{}/api/import/jobs", server.base_url))
        .bearer_auth(TEST_TOKEN)
        .query(&[("project_id", "p1")])
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(listed["jobs"][0]["id"].as_str().unwrap(), job_id);
}

async fn poll_until_terminal(server: &TestServer, job_id: &str) -> ImportJob {
    let http = reqwest::Client::new();
    let start = std::time::Instant::now();
    loop {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "job {} did not reach a terminal state in time",
            job_id
        );
        let job = http
            .get(format!("{}/api/import/jobs/{}", server.base_url, job_id))
            .bearer_auth(TEST_TOKEN)
            .send()
            .await
            .unwrap()
            .json::<ImportJob>()
            .await
            .unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
