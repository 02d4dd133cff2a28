//! Database schema for import job tracking.

/// SQL schema for the import job database.
pub const IMPORT_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS import_jobs (
    id TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    project_id TEXT NOT NULL,
    status TEXT NOT NULL,

    -- Counters, bumped as files are discovered and processed
    total_files INTEGER NOT NULL DEFAULT 0,
    processed_files INTEGER NOT NULL DEFAULT 0,
    failed_files INTEGER NOT NULL DEFAULT 0,

    error_message TEXT,

    -- Timestamps (Unix milliseconds)
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    finished_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_import_jobs_project ON import_jobs(project_id);
CREATE INDEX IF NOT EXISTS idx_import_jobs_status ON import_jobs(status);
"#;
