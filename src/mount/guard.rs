use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::mount::VolumeMounter;

pub struct MountGuard<'a> {
    mounter: &'a dyn VolumeMounter,
    mountpoint: PathBuf,
}

impl<'a> MountGuard<'a> {
    pub fn acquire(
        mounter: &'a dyn VolumeMounter,
        source: &Path,
        mountpoint: &Path,
        secret: &str,
    ) -> Result<Self> {
        mounter.mount(source, mountpoint, secret)?;
        info!("mounted {} at {}", source.display(), mountpoint.display());
        Ok(Self {
            mounter,
            mountpoint: mountpoint.to_path_buf(),
        })
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        match self.mounter.unmount(&self.mountpoint) {
            Ok(()) => info!("unmounted {}", self.mountpoint.display()),
            Err(err) => warn!("{}", err),
        }
    }
}
