use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::error::{MountError, Result};
use crate::mount::inspect::mountpoint_is_mounted;
use crate::mount::ops::{command_failure, unmount_path, DEFAULT_MOUNT_TIMEOUT};
use crate::mount::VolumeMounter;
use crate::util::command::run_with_timeout;

pub const READY_BANNER: &str = "Filesystem mounted and ready.";

pub struct GocryptfsMounter {
    pub helper: PathBuf,
    pub timeout: Duration,
}

impl GocryptfsMounter {
    pub fn new(helper: PathBuf) -> Self {
        Self {
            helper,
            timeout: DEFAULT_MOUNT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl VolumeMounter for GocryptfsMounter {
    fn mount(&self, source: &Path, target: &Path, secret: &str) -> Result<()> {
        if !self.helper.exists() {
            return Err(MountError::HelperMissing(self.helper.clone()).into());
        }
        if !source.is_dir() {
            return Err(MountError::MountFailure(format!(
                "cipher dir {} does not exist",
                source.display()
            ))
            .into());
        }
        if !target.exists() {
            std::fs::create_dir_all(target).map_err(|e| {
                MountError::MountFailure(format!("create {}: {}", target.display(), e))
            })?;
        }
        if mountpoint_is_mounted(target)? {
            return Err(MountError::MountFailure(format!(
                "{} is already mounted",
                target.display()
            ))
            .into());
        }

        let mut cmd = Command::new(&self.helper);
        cmd.arg(source).arg(target);
        let input = format!("{}\n", secret);
        let output = run_with_timeout(&mut cmd, Some(&input), self.timeout)
            .map_err(|e| command_failure(&format!("gocryptfs {}", target.display()), e))?;
        debug!("gocryptfs: {}", output.stdout.trim());
        if !output.success() || !output.stdout.contains(READY_BANNER) {
            return Err(MountError::MountFailure(format!(
                "gocryptfs {} exited with code {}: {}",
                target.display(),
                output.code,
                output.stderr.trim()
            ))
            .into());
        }
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        unmount_path(target, self.timeout)
    }
}
