pub mod models;
pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};

pub use models::{ArtifactCopyRecord, ArtifactKey, JobRecord, NewJob};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DAY_FORMAT: &str = "%Y-%m-%d";

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let is_new = !path.exists();
        let conn = Connection::open(path).map_err(LedgerError::from)?;
        if is_new {
            info!("creating ledger at {}", path.display());
        }
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(LedgerError::from)?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(LedgerError::from)?;
        conn.execute_batch(
            "PRAGMA journal_mode = DELETE;
             PRAGMA synchronous = FULL;",
        )
        .map_err(LedgerError::from)?;
        let version = schema::migrate(&mut conn)?;
        debug!("ledger schema version {}", version);
        Ok(Self { conn })
    }

    /// Inserts `job` unless the same (job id, job name) was already seen on
    /// the job's ingestion day. Returns whether a row was added.
    pub fn record_job_if_new(&self, job: &NewJob) -> Result<bool> {
        Ok(insert_job_if_new(&self.conn, job)?)
    }

    /// Records a whole ingestion batch atomically.
    pub fn record_jobs(&mut self, jobs: &[NewJob]) -> Result<usize> {
        let tx = self.conn.transaction().map_err(LedgerError::from)?;
        let mut inserted = 0;
        for job in jobs {
            if insert_job_if_new(&tx, job)? {
                inserted += 1;
            }
        }
        tx.commit().map_err(LedgerError::from)?;
        Ok(inserted)
    }

    pub fn pending_jobs(&self) -> Result<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, job_name, payload, copied, seen_at
             FROM jobs WHERE copied = 0 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn mark_copied(&self, job_id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE jobs SET copied = 1 WHERE job_id = ?1 AND copied = 0",
            params![job_id],
        )?;
        Ok(changed)
    }

    pub fn lookup_artifact(&self, key: &ArtifactKey) -> Result<Option<ArtifactCopyRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, job_id, filename, source_path, destination_path,
                        content_hash, encryption_key, recorded_at
                 FROM artifact_copies
                 WHERE job_id = ?1 AND filename = ?2 AND source_path = ?3 AND destination_path = ?4
                 ORDER BY id DESC LIMIT 1",
                params![
                    key.job_id,
                    key.filename,
                    path_text(&key.source_path),
                    path_text(&key.destination_path)
                ],
                row_to_artifact,
            )
            .optional()?;
        Ok(record)
    }

    /// Appends `record`; existing rows are never touched.
    pub fn append_artifact(&self, record: &ArtifactCopyRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO artifact_copies
                (job_id, filename, source_path, destination_path,
                 content_hash, encryption_key, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.key.job_id,
                record.key.filename,
                path_text(&record.key.source_path),
                path_text(&record.key.destination_path),
                record.content_hash,
                record.encryption_key,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn lookup_encryption_key(&self, filename: &str) -> Result<Option<String>> {
        let key = self
            .conn
            .query_row(
                "SELECT encryption_key FROM artifact_copies
                 WHERE filename = ?1 AND encryption_key IS NOT NULL
                 ORDER BY id DESC LIMIT 1",
                params![filename],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key)
    }

    /// Every row recorded for `key`, oldest first.
    pub fn artifact_history(&self, key: &ArtifactKey) -> Result<Vec<ArtifactCopyRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, filename, source_path, destination_path,
                    content_hash, encryption_key, recorded_at
             FROM artifact_copies
             WHERE job_id = ?1 AND filename = ?2 AND source_path = ?3 AND destination_path = ?4
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(
                params![
                    key.job_id,
                    key.filename,
                    path_text(&key.source_path),
                    path_text(&key.destination_path)
                ],
                row_to_artifact,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn job_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?)
    }

    pub fn artifact_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM artifact_copies", [], |row| row.get(0))?)
    }
}

fn insert_job_if_new(conn: &Connection, job: &NewJob) -> std::result::Result<bool, LedgerError> {
    let day = job.seen_at.format(DAY_FORMAT).to_string();
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM jobs WHERE job_id = ?1 AND job_name = ?2 AND seen_day = ?3 LIMIT 1",
            params![job.job_id, job.job_name, day],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(false);
    }
    let payload = serde_json::to_string(&job.raw_payload)?;
    conn.execute(
        "INSERT INTO jobs (job_id, job_name, payload, copied, seen_at, seen_day)
         VALUES (?1, ?2, ?3, 0, ?4, ?5)",
        params![job.job_id, job.job_name, payload, job.seen_at.to_rfc3339(), day],
    )?;
    Ok(true)
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
    let payload: String = row.get("payload")?;
    let raw_payload = serde_json::from_str(&payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let seen_at: String = row.get("seen_at")?;
    let copied: i64 = row.get("copied")?;
    Ok(JobRecord {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        job_name: row.get("job_name")?,
        raw_payload,
        copied: copied != 0,
        seen_at: parse_timestamp(5, &seen_at)?,
    })
}

fn row_to_artifact(row: &rusqlite::Row) -> rusqlite::Result<ArtifactCopyRecord> {
    let source: String = row.get("source_path")?;
    let destination: String = row.get("destination_path")?;
    let recorded_at: String = row.get("recorded_at")?;
    Ok(ArtifactCopyRecord {
        id: Some(row.get("id")?),
        key: ArtifactKey {
            job_id: row.get("job_id")?,
            filename: row.get("filename")?,
            source_path: PathBuf::from(source),
            destination_path: PathBuf::from(destination),
        },
        content_hash: row.get("content_hash")?,
        encryption_key: row.get("encryption_key")?,
        recorded_at: parse_timestamp(7, &recorded_at)?,
    })
}
