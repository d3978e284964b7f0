pub mod dump;
pub mod xo_cli;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::Result;
use crate::ledger::{Ledger, NewJob};
use crate::types::BackupMode;

pub use dump::DumpFileSource;
pub use xo_cli::XoCliSource;

pub type JobLogs = Map<String, Value>;

pub trait JobSource {
    fn fetch(&self) -> Result<JobLogs>;
}

pub fn select_jobs(
    logs: &JobLogs,
    mode: BackupMode,
    today: NaiveDate,
) -> Vec<(String, String, Value)> {
    let mut selected = Vec::new();
    for (log_id, entry) in logs {
        let Some(job_id) = entry.get("jobId").and_then(Value::as_str) else {
            warn!("job log {} has no jobId", log_id);
            continue;
        };
        if entry.get("status").and_then(Value::as_str) != Some("success") {
            continue;
        }
        let entry_mode = entry
            .get("data")
            .and_then(|data| data.get("mode"))
            .and_then(Value::as_str);
        if entry_mode != Some(mode.as_str()) {
            continue;
        }
        let Some(started) = entry.get("start").and_then(Value::as_i64).and_then(start_time) else {
            warn!("job log {} has no usable start time", log_id);
            continue;
        };
        if started.date_naive() != today {
            continue;
        }
        let job_name = entry
            .get("jobName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        selected.push((job_id.to_string(), job_name, entry.clone()));
    }
    selected
}

fn start_time(millis: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(millis).single()
}

pub fn ingest(
    ledger: &mut Ledger,
    source: &dyn JobSource,
    mode: BackupMode,
    now: DateTime<Local>,
) -> Result<usize> {
    let logs = source.fetch()?;
    let jobs: Vec<NewJob> = select_jobs(&logs, mode, now.date_naive())
        .into_iter()
        .map(|(job_id, job_name, raw_payload)| NewJob {
            job_id,
            job_name,
            raw_payload,
            seen_at: now,
        })
        .collect();
    let inserted = ledger.record_jobs(&jobs)?;
    info!(
        "{} {} job(s) from upstream today, {} new",
        jobs.len(),
        mode,
        inserted
    );
    Ok(inserted)
}
