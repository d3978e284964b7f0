use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, UpstreamError, XocopyError};
use crate::upstream::dump::decode_logs;
use crate::upstream::{JobLogs, JobSource};
use crate::util::command::{run_with_timeout, CommandError};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_XO_CLI: &str = "/opt/xen-orchestra/node_modules/.bin/xo-cli";

pub struct XoCliSource {
    pub host: String,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub xo_cli: String,
    pub xo_url: String,
    pub xo_user: String,
    pub xo_password: String,
    pub timeout: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl XoCliSource {
    // scripts go to the remote sh on stdin, keeping credentials out of argv
    fn ssh(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-o").arg(format!("ConnectTimeout={}", self.timeout.as_secs().max(1)));
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(format!("{}@{}", self.user, self.host)).arg("sh");
        cmd
    }

    fn remote(&self, what: &str, remote: &str) -> std::result::Result<String, UpstreamError> {
        let mut cmd = self.ssh();
        let script = format!("{}\n", remote);
        let output =
            run_with_timeout(&mut cmd, Some(&script), self.timeout).map_err(|e| match e {
                CommandError::TimedOut(_) => {
                    UpstreamError::Timeout(format!("{} on {}", what, self.host))
                }
                other => UpstreamError::Command(format!("{}: {}", what, other)),
            })?;
        if !output.success() {
            return Err(UpstreamError::Command(format!(
                "{} on {} failed with exit code {}: {}",
                what,
                self.host,
                output.code,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn register_script(&self) -> std::result::Result<String, UpstreamError> {
        let words = [
            self.xo_cli.as_str(),
            "--register",
            self.xo_url.as_str(),
            self.xo_user.as_str(),
            self.xo_password.as_str(),
        ];
        shlex::try_join(words)
            .map_err(|e| UpstreamError::Command(format!("xo-cli register arguments: {}", e)))
    }

    fn fetch_once(&self) -> std::result::Result<JobLogs, UpstreamError> {
        let register = self.register_script()?;
        self.remote("xo-cli register", &register)?;
        debug!("fetching backup logs from {}", self.host);
        let logs = self
            .remote(
                "xo-cli backupNg.getAllLogs",
                &format!("{} backupNg.getAllLogs --json", self.xo_cli),
            )
            .and_then(|stdout| decode_logs(&stdout));
        let unregister = format!("{} --unregister", self.xo_cli);
        if let Err(err) = self.remote("xo-cli unregister", &unregister) {
            warn!("{}", err);
        }
        logs
    }
}

impl JobSource for XoCliSource {
    fn fetch(&self) -> Result<JobLogs> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_once() {
                Ok(logs) => return Ok(logs),
                Err(err) => {
                    let err = XocopyError::from(err);
                    if !err.is_transient() || attempt >= attempts {
                        return Err(err);
                    }
                    warn!("{} (attempt {}/{}), retrying", err, attempt, attempts);
                    attempt += 1;
                    thread::sleep(self.retry_delay);
                }
            }
        }
    }
}
