//! SQLite store for the vault.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::models::{NewVaultAsset, ProjectSource, ProjectVersion, VaultAsset};
use super::schema::VAULT_SCHEMA_SQL;
use crate::import::AssetCatalog;
use crate::metadata::AudioMetadata;

/// Trait for vault storage operations.
pub trait VaultStore: Send + Sync {
    // ==================== Versions ====================

    fn create_version(&self, version: &ProjectVersion) -> Result<()>;

    fn get_version(&self, id: &str) -> Result<Option<ProjectVersion>>;

    // ==================== Assets ====================

    /// Insert a registered asset. Fails on a duplicate dedup triple.
    fn insert_asset(&self, asset: &VaultAsset) -> Result<()>;

    fn get_asset(&self, id: &str) -> Result<Option<VaultAsset>>;

    /// Dedup check on the (provider, source_file_id, revision) triple.
    fn asset_exists(&self, provider: &str, source_file_id: &str, revision: &str) -> Result<bool>;

    /// All assets registered by one import job.
    fn assets_for_job(&self, job_id: &str) -> Result<Vec<VaultAsset>>;

    // ==================== Source configuration ====================

    fn get_project_source(&self, project_id: &str) -> Result<Option<ProjectSource>>;

    fn upsert_project_source(&self, source: &ProjectSource) -> Result<()>;
}

/// SQLite implementation of VaultStore.
pub struct SqliteVaultStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVaultStore {
    /// Open or create a vault database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open vault database: {:?}", path))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.execute_batch(VAULT_SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.execute_batch(VAULT_SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_version(row: &rusqlite::Row) -> rusqlite::Result<ProjectVersion> {
        Ok(ProjectVersion {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            label: row.get("label")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_asset(row: &rusqlite::Row) -> rusqlite::Result<VaultAsset> {
        let source_metadata = row
            .get::<_, Option<String>>("source_metadata")?
            .and_then(|s| serde_json::from_str(&s).ok());

        // Audio metadata columns are all-or-nothing keyed on duration_ms
        let audio = match row.get::<_, Option<i64>>("duration_ms")? {
            Some(duration_ms) => Some(AudioMetadata {
                duration_ms,
                sample_rate: row.get("sample_rate")?,
                bit_rate: row.get("bit_rate")?,
                channels: row.get("channels")?,
                format: row
                    .get::<_, Option<String>>("audio_format")?
                    .unwrap_or_default(),
            }),
            None => None,
        };

        Ok(VaultAsset {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            version_id: row.get("version_id")?,
            storage_key: row.get("storage_key")?,
            file_name: row.get("file_name")?,
            size_bytes: row.get("size_bytes")?,
            mime_type: row.get("mime_type")?,
            source_provider: row.get("source_provider")?,
            source_file_id: row.get("source_file_id")?,
            source_revision: row.get("source_revision")?,
            source_metadata,
            audio,
            import_job_id: row.get("import_job_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl VaultStore for SqliteVaultStore {
    fn create_version(&self, version: &ProjectVersion) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO vault_versions (id, project_id, label, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                version.id,
                version.project_id,
                version.label,
                version.created_at
            ],
        )?;
        Ok(())
    }

    fn get_version(&self, id: &str) -> Result<Option<ProjectVersion>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM vault_versions WHERE id = ?1",
                params![id],
                Self::row_to_version,
            )
            .optional()?;
        Ok(result)
    }

    fn insert_asset(&self, asset: &VaultAsset) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let source_metadata_json = asset
            .source_metadata
            .as_ref()
            .and_then(|m| serde_json::to_string(m).ok());
        let audio = asset.audio.as_ref();

        conn.execute(
            r#"
            INSERT INTO vault_assets (
                id, project_id, version_id, storage_key, file_name, size_bytes, mime_type,
                source_provider, source_file_id, source_revision, source_metadata,
                duration_ms, sample_rate, bit_rate, channels, audio_format,
                import_job_id, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18
            )
            "#,
            params![
                asset.id,
                asset.project_id,
                asset.version_id,
                asset.storage_key,
                asset.file_name,
                asset.size_bytes,
                asset.mime_type,
                asset.source_provider,
                asset.source_file_id,
                asset.source_revision,
                source_metadata_json,
                audio.map(|a| a.duration_ms),
                audio.and_then(|a| a.sample_rate),
                audio.and_then(|a| a.bit_rate),
                audio.and_then(|a| a.channels),
                audio.map(|a| a.format.clone()),
                asset.import_job_id,
                asset.created_at,
            ],
        )
        .with_context(|| {
            format!(
                "Failed to insert asset for {}/{}",
                asset.source_provider, asset.source_file_id
            )
        })?;
        Ok(())
    }

    fn get_asset(&self, id: &str) -> Result<Option<VaultAsset>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM vault_assets WHERE id = ?1",
                params![id],
                Self::row_to_asset,
            )
            .optional()?;
        Ok(result)
    }

    fn asset_exists(&self, provider: &str, source_file_id: &str, revision: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists = conn.query_row(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM vault_assets
                WHERE source_provider = ?1 AND source_file_id = ?2 AND source_revision = ?3
            )
            "#,
            params![provider, source_file_id, revision],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(exists)
    }

    fn assets_for_job(&self, job_id: &str) -> Result<Vec<VaultAsset>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM vault_assets WHERE import_job_id = ?1 ORDER BY created_at ASC",
        )?;
        let assets = stmt
            .query_map(params![job_id], Self::row_to_asset)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(assets)
    }

    fn get_project_source(&self, project_id: &str) -> Result<Option<ProjectSource>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM project_sources WHERE project_id = ?1",
                params![project_id],
                |row| {
                    Ok(ProjectSource {
                        project_id: row.get("project_id")?,
                        provider: row.get("provider")?,
                        folder_id: row.get("folder_id")?,
                        active: row.get::<_, i32>("active")? != 0,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    fn upsert_project_source(&self, source: &ProjectSource) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO project_sources (project_id, provider, folder_id, active)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(project_id) DO UPDATE SET
                provider = excluded.provider,
                folder_id = excluded.folder_id,
                active = excluded.active
            "#,
            params![
                source.project_id,
                source.provider,
                source.folder_id,
                source.active as i32
            ],
        )?;
        Ok(())
    }
}

/// The server-side pipeline talks to the store directly.
#[async_trait]
impl AssetCatalog for SqliteVaultStore {
    async fn asset_exists(
        &self,
        provider: &str,
        source_file_id: &str,
        revision: &str,
    ) -> Result<bool> {
        VaultStore::asset_exists(self, provider, source_file_id, revision)
    }

    async fn create_version(&self, project_id: &str, label: &str) -> Result<String> {
        let version = ProjectVersion::new(project_id, label);
        VaultStore::create_version(self, &version)?;
        Ok(version.id)
    }

    async fn register_asset(&self, new: &NewVaultAsset) -> Result<String> {
        if VaultStore::asset_exists(
            self,
            &new.source_provider,
            &new.source_file_id,
            &new.source_revision,
        )? {
            bail!(
                "asset {}/{} at revision {} is already registered",
                new.source_provider,
                new.source_file_id,
                new.source_revision
            );
        }
        let asset = VaultAsset::from_new(new.clone());
        self.insert_asset(&asset)?;
        Ok(asset.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Asset rows reference a real version; the schema enforces the key.
    fn seed_version(store: &SqliteVaultStore) -> String {
        let version = ProjectVersion::new("p1", "seed");
        VaultStore::create_version(store, &version).unwrap();
        version.id
    }

    fn new_asset(version_id: &str, provider: &str, file_id: &str, revision: &str) -> NewVaultAsset {
        NewVaultAsset {
            project_id: "p1".to_string(),
            version_id: version_id.to_string(),
            storage_key: format!("p1/v1/{}-file.wav", file_id),
            file_name: "file.wav".to_string(),
            size_bytes: 1024,
            mime_type: Some("audio/wav".to_string()),
            source_provider: provider.to_string(),
            source_file_id: file_id.to_string(),
            source_revision: revision.to_string(),
            source_metadata: None,
            audio: None,
            import_job_id: Some("job1".to_string()),
        }
    }

    #[test]
    fn test_version_crud() {
        let store = SqliteVaultStore::in_memory().unwrap();
        let version = ProjectVersion::new("p1", "Remote import 2026-08-23");
        VaultStore::create_version(&store, &version).unwrap();

        let retrieved = store.get_version(&version.id).unwrap().unwrap();
        assert_eq!(retrieved.project_id, "p1");
        assert_eq!(retrieved.label, "Remote import 2026-08-23");
        assert!(store.get_version("missing").unwrap().is_none());
    }

    #[test]
    fn test_asset_round_trip_with_audio_metadata() {
        let store = SqliteVaultStore::in_memory().unwrap();
        let version_id = seed_version(&store);
        let mut new = new_asset(&version_id, "dropbox", "f1", "h1");
        new.audio = Some(AudioMetadata {
            duration_ms: 12480,
            sample_rate: Some(44100),
            bit_rate: Some(1411),
            channels: Some(2),
            format: "wav".to_string(),
        });
        new.source_metadata = Some(serde_json::json!({ "modified_at": 123 }));

        let asset = VaultAsset::from_new(new);
        store.insert_asset(&asset).unwrap();

        let retrieved = store.get_asset(&asset.id).unwrap().unwrap();
        assert_eq!(retrieved.audio.as_ref().unwrap().duration_ms, 12480);
        assert_eq!(retrieved.audio.as_ref().unwrap().format, "wav");
        assert_eq!(
            retrieved.source_metadata.unwrap()["modified_at"],
            serde_json::json!(123)
        );
    }

    #[test]
    fn test_asset_exists_matches_full_triple() {
        let store = SqliteVaultStore::in_memory().unwrap();
        let version_id = seed_version(&store);
        store
            .insert_asset(&VaultAsset::from_new(new_asset(&version_id, "dropbox", "f1", "h1")))
            .unwrap();

        assert!(VaultStore::asset_exists(&store, "dropbox", "f1", "h1").unwrap());
        assert!(!VaultStore::asset_exists(&store, "dropbox", "f1", "h2").unwrap());
        assert!(!VaultStore::asset_exists(&store, "gdrive", "f1", "h1").unwrap());
        assert!(!VaultStore::asset_exists(&store, "dropbox", "f2", "h1").unwrap());
    }

    #[test]
    fn test_duplicate_triple_rejected() {
        let store = SqliteVaultStore::in_memory().unwrap();
        let version_id = seed_version(&store);
        store
            .insert_asset(&VaultAsset::from_new(new_asset(&version_id, "dropbox", "f1", "h1")))
            .unwrap();
        let result =
            store.insert_asset(&VaultAsset::from_new(new_asset(&version_id, "dropbox", "f1", "h1")));
        assert!(result.is_err());
    }

    #[test]
    fn test_assets_for_job() {
        let store = SqliteVaultStore::in_memory().unwrap();
        let version_id = seed_version(&store);
        store
            .insert_asset(&VaultAsset::from_new(new_asset(&version_id, "dropbox", "f1", "h1")))
            .unwrap();
        store
            .insert_asset(&VaultAsset::from_new(new_asset(&version_id, "dropbox", "f2", "h2")))
            .unwrap();
        let mut other = new_asset(&version_id, "dropbox", "f3", "h3");
        other.import_job_id = Some("job2".to_string());
        store.insert_asset(&VaultAsset::from_new(other)).unwrap();

        assert_eq!(store.assets_for_job("job1").unwrap().len(), 2);
        assert_eq!(store.assets_for_job("job2").unwrap().len(), 1);
    }

    #[test]
    fn test_project_source_upsert() {
        let store = SqliteVaultStore::in_memory().unwrap();
        assert!(store.get_project_source("p1").unwrap().is_none());

        store
            .upsert_project_source(&ProjectSource {
                project_id: "p1".to_string(),
                provider: "dropbox".to_string(),
                folder_id: "folder-a".to_string(),
                active: true,
            })
            .unwrap();
        let source = store.get_project_source("p1").unwrap().unwrap();
        assert_eq!(source.folder_id, "folder-a");
        assert!(source.active);

        store
            .upsert_project_source(&ProjectSource {
                project_id: "p1".to_string(),
                provider: "dropbox".to_string(),
                folder_id: "folder-b".to_string(),
                active: false,
            })
            .unwrap();
        let source = store.get_project_source("p1").unwrap().unwrap();
        assert_eq!(source.folder_id, "folder-b");
        assert!(!source.active);
    }

    #[tokio::test]
    async fn test_catalog_register_rejects_duplicate() {
        let store = SqliteVaultStore::in_memory().unwrap();
        let version_id = seed_version(&store);
        AssetCatalog::register_asset(&store, &new_asset(&version_id, "dropbox", "f1", "h1"))
            .await
            .unwrap();
        let result =
            AssetCatalog::register_asset(&store, &new_asset(&version_id, "dropbox", "f1", "h1"))
                .await;
        assert!(result.is_err());
    }
}
