use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: String,
    pub descriptors: usize,
    pub copied: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    pub aborted: Option<String>,
}

impl JobReport {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            ..Default::default()
        }
    }

    pub fn nothing_to_copy(&self) -> bool {
        self.descriptors == 0
    }

    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.failed == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub jobs: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub nothing_to_copy: usize,
    pub copied: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn add(&mut self, report: &JobReport) {
        self.jobs += 1;
        if report.is_success() {
            self.jobs_completed += 1;
        } else {
            self.jobs_failed += 1;
        }
        if report.nothing_to_copy() {
            self.nothing_to_copy += 1;
        }
        self.copied += report.copied;
        self.up_to_date += report.up_to_date;
        self.skipped += report.skipped;
        self.failed += report.failed;
    }

    pub fn log(&self) {
        info!(
            "run finished: {} job(s), {} completed, {} failed, {} with nothing to copy; \
             artifacts: {} copied, {} up to date, {} skipped, {} failed",
            self.jobs,
            self.jobs_completed,
            self.jobs_failed,
            self.nothing_to_copy,
            self.copied,
            self.up_to_date,
            self.skipped,
            self.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_artifact_blocks_completion() {
        let mut report = JobReport::new("J1");
        report.descriptors = 1;
        report.copied = 1;
        assert!(report.is_success());
        report.failed = 1;
        assert!(!report.is_success());

        let mut summary = RunSummary::default();
        summary.add(&report);
        summary.add(&JobReport::new("J2"));
        assert_eq!(summary.jobs, 2);
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(summary.jobs_completed, 1);
        assert_eq!(summary.nothing_to_copy, 1);
    }
}
