pub mod gocryptfs;
pub mod guard;
pub mod inspect;
pub mod ops;

use std::path::Path;

use crate::error::Result;

pub trait VolumeMounter {
    fn mount(&self, source: &Path, target: &Path, secret: &str) -> Result<()>;
    fn unmount(&self, target: &Path) -> Result<()>;
}

pub use gocryptfs::GocryptfsMounter;
pub use guard::MountGuard;
pub use ops::DeviceMounter;
