use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_id: String,
    pub job_name: String,
    pub raw_payload: Value,
    pub seen_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub job_id: String,
    pub job_name: String,
    pub raw_payload: Value,
    pub copied: bool,
    pub seen_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub job_id: String,
    pub filename: String,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
}

impl ArtifactKey {
    pub fn new(job_id: &str, filename: &str, source_path: &Path, destination_path: &Path) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            source_path: source_path.to_path_buf(),
            destination_path: destination_path.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactCopyRecord {
    pub id: Option<i64>,
    pub key: ArtifactKey,
    pub content_hash: String,
    pub encryption_key: Option<String>,
    pub recorded_at: DateTime<Local>,
}

impl ArtifactCopyRecord {
    pub fn new(key: ArtifactKey, content_hash: String, encryption_key: Option<String>) -> Self {
        Self {
            id: None,
            key,
            content_hash,
            encryption_key,
            recorded_at: Local::now(),
        }
    }
}
