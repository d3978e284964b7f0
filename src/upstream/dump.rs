use std::fs;
use std::path::PathBuf;

use crate::error::{Result, UpstreamError};
use crate::upstream::{JobLogs, JobSource};

pub struct DumpFileSource {
    pub path: PathBuf,
}

impl JobSource for DumpFileSource {
    fn fetch(&self) -> Result<JobLogs> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            UpstreamError::Command(format!("read {}: {}", self.path.display(), e))
        })?;
        Ok(decode_logs(&contents)?)
    }
}

pub fn decode_logs(contents: &str) -> std::result::Result<JobLogs, UpstreamError> {
    serde_json::from_str(contents).map_err(|e| UpstreamError::Decode(e.to_string()))
}
