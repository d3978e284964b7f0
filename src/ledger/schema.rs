use rusqlite::{params, Connection};

use crate::error::LedgerError;

pub struct SchemaStep {
    pub version: i64,
    pub apply: fn(&Connection) -> rusqlite::Result<()>,
    pub required_columns: &'static [(&'static str, &'static [&'static str])],
}

const JOBS_COLUMNS_V1: &[&str] = &[
    "id", "job_id", "job_name", "payload", "copied", "seen_at", "seen_day",
];
const ARTIFACT_COLUMNS_V1: &[&str] = &[
    "id",
    "job_id",
    "filename",
    "source_path",
    "destination_path",
    "content_hash",
    "recorded_at",
];
const ARTIFACT_COLUMNS_V2: &[&str] = &[
    "id",
    "job_id",
    "filename",
    "source_path",
    "destination_path",
    "content_hash",
    "recorded_at",
    "encryption_key",
];

/// Version 1: plain copies only.
fn create_v1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            job_name TEXT NOT NULL,
            payload TEXT NOT NULL,
            copied INTEGER NOT NULL DEFAULT 0,
            seen_at TEXT NOT NULL,
            seen_day TEXT NOT NULL
        );
        CREATE INDEX idx_jobs_ingest ON jobs(job_id, job_name, seen_day);
        CREATE INDEX idx_jobs_copied ON jobs(copied);
        CREATE TABLE artifact_copies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            source_path TEXT NOT NULL,
            destination_path TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );
        CREATE INDEX idx_artifact_copies_key
            ON artifact_copies(job_id, filename, source_path, destination_path);",
    )
}

/// Version 2: encrypted transfers keep their per-file key.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "ALTER TABLE artifact_copies ADD COLUMN encryption_key TEXT;
        CREATE INDEX idx_artifact_copies_filename ON artifact_copies(filename);",
    )
}

pub const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        apply: create_v1,
        required_columns: &[("jobs", JOBS_COLUMNS_V1), ("artifact_copies", ARTIFACT_COLUMNS_V1)],
    },
    SchemaStep {
        version: 2,
        apply: migrate_v1_to_v2,
        required_columns: &[("jobs", JOBS_COLUMNS_V1), ("artifact_copies", ARTIFACT_COLUMNS_V2)],
    },
];

pub fn latest_version() -> i64 {
    SCHEMA_STEPS.last().map(|step| step.version).unwrap_or(0)
}

pub fn current_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
}

fn table_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        params![],
        |row| row.get(0),
    )
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

pub fn validate(conn: &Connection, version: i64) -> Result<(), LedgerError> {
    let step = SCHEMA_STEPS
        .iter()
        .find(|step| step.version == version)
        .ok_or_else(|| LedgerError::Schema(format!("unknown ledger version {}", version)))?;
    for (table, expected) in step.required_columns {
        let columns = table_columns(conn, table)?;
        for column in expected.iter() {
            if !columns.iter().any(|c| c == column) {
                return Err(LedgerError::Schema(format!(
                    "table {} is missing column {} for version {}",
                    table, column, version
                )));
            }
        }
    }
    Ok(())
}

/// Brings `conn` to the latest version inside one transaction.
pub fn migrate(conn: &mut Connection) -> Result<i64, LedgerError> {
    let from = current_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(LedgerError::Schema(format!(
            "ledger version {} is newer than supported version {}",
            from, latest
        )));
    }
    if from == 0 && table_count(conn)? > 0 {
        return Err(LedgerError::Schema(
            "database has tables but no ledger version".to_string(),
        ));
    }
    if from > 0 {
        validate(conn, from)?;
    }
    if from == latest {
        return Ok(from);
    }
    let tx = conn.transaction()?;
    for step in SCHEMA_STEPS.iter().filter(|step| step.version > from) {
        tracing::info!("migrating ledger to version {}", step.version);
        (step.apply)(&tx)?;
    }
    tx.execute_batch(&format!("PRAGMA user_version = {};", latest))?;
    tx.commit()?;
    Ok(latest)
}
