//! SQLite store for import jobs.
//!
//! The state machine is enforced in SQL: every update is guarded on a
//! non-terminal status and an update matching zero rows is an error, so a
//! COMPLETED or FAILED job can never be mutated again.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::models::{ImportJob, ImportJobStatus, ImportSourceType};
use super::schema::IMPORT_SCHEMA_SQL;

/// Trait for import job tracking.
pub trait ImportJobStore: Send + Sync {
    fn create_job(&self, job: &ImportJob) -> Result<()>;

    fn get_job(&self, id: &str) -> Result<Option<ImportJob>>;

    /// Recent jobs for a project, newest first.
    fn jobs_for_project(&self, project_id: &str, limit: usize) -> Result<Vec<ImportJob>>;

    /// PENDING -> RUNNING, recording `started_at`.
    fn mark_running(&self, id: &str) -> Result<()>;

    /// Bump `total_files` as enumeration discovers files.
    fn add_discovered(&self, id: &str, count: i64) -> Result<()>;

    /// Bump `processed_files` (success or duplicate-skip).
    fn record_processed(&self, id: &str) -> Result<()>;

    /// Bump `failed_files`.
    fn record_failed(&self, id: &str) -> Result<()>;

    /// Terminal: COMPLETED with `finished_at`.
    fn mark_completed(&self, id: &str) -> Result<()>;

    /// Terminal: FAILED with `finished_at` and an error message.
    fn mark_failed(&self, id: &str, error: &str) -> Result<()>;
}

/// SQLite implementation of ImportJobStore.
pub struct SqliteImportJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImportJobStore {
    /// Open or create an import job database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open import job database: {:?}", path))?;
        conn.execute_batch(IMPORT_SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database. Used in tests and by the watcher agent, which
    /// tracks its single-file runs without persisting them.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(IMPORT_SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ImportJob> {
        Ok(ImportJob {
            id: row.get("id")?,
            source_type: ImportSourceType::parse(&row.get::<_, String>("source_type")?)
                .unwrap_or(ImportSourceType::Remote),
            project_id: row.get("project_id")?,
            status: ImportJobStatus::parse(&row.get::<_, String>("status")?)
                .unwrap_or(ImportJobStatus::Pending),
            total_files: row.get("total_files")?,
            processed_files: row.get("processed_files")?,
            failed_files: row.get("failed_files")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
        })
    }

    /// Run a guarded UPDATE; zero affected rows means the job is missing or
    /// already terminal.
    fn guarded_update(&self, id: &str, sql: &str, extra: &[&dyn rusqlite::ToSql]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&id];
        values.extend_from_slice(extra);
        let affected = conn.execute(sql, values.as_slice())?;
        if affected == 0 {
            bail!("import job {} is missing or already terminal", id);
        }
        Ok(())
    }
}

impl ImportJobStore for SqliteImportJobStore {
    fn create_job(&self, job: &ImportJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO import_jobs (
                id, source_type, project_id, status,
                total_files, processed_files, failed_files,
                error_message, created_at, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                job.id,
                job.source_type.as_str(),
                job.project_id,
                job.status.as_str(),
                job.total_files,
                job.processed_files,
                job.failed_files,
                job.error_message,
                job.created_at,
                job.started_at,
                job.finished_at,
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<ImportJob>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM import_jobs WHERE id = ?1",
                params![id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(result)
    }

    fn jobs_for_project(&self, project_id: &str, limit: usize) -> Result<Vec<ImportJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM import_jobs WHERE project_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let jobs = stmt
            .query_map(params![project_id, limit as i64], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn mark_running(&self, id: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.guarded_update(
            id,
            "UPDATE import_jobs SET status = 'RUNNING', started_at = ?2 \
             WHERE id = ?1 AND status = 'PENDING'",
            &[&now],
        )
    }

    fn add_discovered(&self, id: &str, count: i64) -> Result<()> {
        self.guarded_update(
            id,
            "UPDATE import_jobs SET total_files = total_files + ?2 \
             WHERE id = ?1 AND status IN ('PENDING', 'RUNNING')",
            &[&count],
        )
    }

    fn record_processed(&self, id: &str) -> Result<()> {
        self.guarded_update(
            id,
            "UPDATE import_jobs SET processed_files = processed_files + 1 \
             WHERE id = ?1 AND status IN ('PENDING', 'RUNNING')",
            &[],
        )
    }

    fn record_failed(&self, id: &str) -> Result<()> {
        self.guarded_update(
            id,
            "UPDATE import_jobs SET failed_files = failed_files + 1 \
             WHERE id = ?1 AND status IN ('PENDING', 'RUNNING')",
            &[],
        )
    }

    fn mark_completed(&self, id: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.guarded_update(
            id,
            "UPDATE import_jobs SET status = 'COMPLETED', finished_at = ?2 \
             WHERE id = ?1 AND status IN ('PENDING', 'RUNNING')",
            &[&now],
        )
    }

    fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.guarded_update(
            id,
            "UPDATE import_jobs SET status = 'FAILED', finished_at = ?2, error_message = ?3 \
             WHERE id = ?1 AND status IN ('PENDING', 'RUNNING')",
            &[&now, &error],
        )
    }
}
