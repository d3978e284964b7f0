use std::path::Path;

use nix::sys::statvfs::statvfs;

use crate::error::{Result, XocopyError};

pub trait SpaceProbe {
    fn available_bytes(&self, path: &Path) -> Result<u64>;
}

pub struct StatvfsProbe;

impl SpaceProbe for StatvfsProbe {
    fn available_bytes(&self, path: &Path) -> Result<u64> {
        let stat = statvfs(path)
            .map_err(|e| XocopyError::message(format!("statvfs {}: {}", path.display(), e)))?;
        Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
    }
}
