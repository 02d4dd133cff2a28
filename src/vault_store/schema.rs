//! Database schema for the vault store.
//!
//! - vault_versions: grouping checkpoints within a project
//! - vault_assets: registered assets, one row per imported revision
//! - project_sources: per-project remote folder configuration

/// SQL schema for the vault database.
pub const VAULT_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS vault_versions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    label TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS vault_assets (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    version_id TEXT NOT NULL,
    storage_key TEXT NOT NULL,
    file_name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    mime_type TEXT,

    -- Provenance
    source_provider TEXT NOT NULL,
    source_file_id TEXT NOT NULL,
    source_revision TEXT NOT NULL,
    source_metadata TEXT,

    -- Audio metadata (from ffprobe, audio assets only)
    duration_ms INTEGER,
    sample_rate INTEGER,
    bit_rate INTEGER,
    channels INTEGER,
    audio_format TEXT,

    import_job_id TEXT,
    created_at INTEGER NOT NULL,

    FOREIGN KEY (version_id) REFERENCES vault_versions(id)
);

CREATE TABLE IF NOT EXISTS project_sources (
    project_id TEXT PRIMARY KEY,
    provider TEXT NOT NULL,
    folder_id TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

-- The dedup key: one asset per (provider, file, revision)
CREATE UNIQUE INDEX IF NOT EXISTS idx_vault_assets_source
    ON vault_assets(source_provider, source_file_id, source_revision);

CREATE INDEX IF NOT EXISTS idx_vault_assets_project ON vault_assets(project_id);
CREATE INDEX IF NOT EXISTS idx_vault_assets_job ON vault_assets(import_job_id);
CREATE INDEX IF NOT EXISTS idx_vault_versions_project ON vault_versions(project_id);
"#;
