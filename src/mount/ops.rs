use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::error::{MountError, Result};
use crate::mount::VolumeMounter;
use crate::util::command::{run_with_timeout, CommandError};

pub const DEFAULT_MOUNT_TIMEOUT: Duration = Duration::from_secs(60);

pub fn mount_device(
    device: &Path,
    mountpoint: &Path,
    options: Option<&str>,
    timeout: Duration,
) -> Result<()> {
    let mut cmd = Command::new("mount");
    if let Some(options) = options {
        cmd.arg("-o").arg(options);
    }
    cmd.arg(device).arg(mountpoint);
    let output = run_with_timeout(&mut cmd, None, timeout)
        .map_err(|e| command_failure(&format!("mount {}", device.display()), e))?;
    if !output.success() {
        return Err(MountError::MountFailure(format!(
            "{} failed with exit code {}: {}",
            device.display(),
            output.code,
            output.stderr.trim()
        ))
        .into());
    }
    Ok(())
}

pub fn unmount_path(mountpoint: &Path, timeout: Duration) -> Result<()> {
    let mut cmd = Command::new("umount");
    cmd.arg(mountpoint);
    let output = run_with_timeout(&mut cmd, None, timeout)
        .map_err(|e| command_failure(&format!("umount {}", mountpoint.display()), e))?;
    if !output.success() {
        return Err(MountError::UmountFailure(format!(
            "{} failed with exit code {}: {}",
            mountpoint.display(),
            output.code,
            output.stderr.trim()
        ))
        .into());
    }
    Ok(())
}

pub(crate) fn command_failure(what: &str, err: CommandError) -> crate::error::XocopyError {
    match err {
        CommandError::TimedOut(_) => MountError::Timeout(what.to_string()).into(),
        other => MountError::MountFailure(format!("{}: {}", what, other)).into(),
    }
}

pub struct DeviceMounter {
    pub options: Option<String>,
    pub timeout: Duration,
}

impl Default for DeviceMounter {
    fn default() -> Self {
        Self {
            options: None,
            timeout: DEFAULT_MOUNT_TIMEOUT,
        }
    }
}

impl VolumeMounter for DeviceMounter {
    fn mount(&self, source: &Path, target: &Path, _secret: &str) -> Result<()> {
        if !target.exists() {
            std::fs::create_dir_all(target).map_err(|e| {
                MountError::MountFailure(format!("create {}: {}", target.display(), e))
            })?;
        }
        mount_device(source, target, self.options.as_deref(), self.timeout)
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        unmount_path(target, self.timeout)
    }
}
