use std::path::Path;

use crate::config::load_config;
use crate::error::Result;
use crate::ledger::Ledger;

pub fn run_pending(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let ledger = Ledger::open(&cfg.ledger)?;
    let jobs = ledger.pending_jobs()?;
    let footer = format!(
        "{} pending of {} job(s), {} artifact copies recorded",
        jobs.len(),
        ledger.job_count()?,
        ledger.artifact_count()?
    );
    for job in jobs {
        println!(
            "{}\t{}\t{}",
            job.seen_at.format("%Y-%m-%d %H:%M:%S"),
            job.job_id,
            job.job_name
        );
    }
    println!("{}", footer);
    Ok(())
}
