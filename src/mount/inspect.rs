use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, XocopyError};

const MOUNTS: &str = "/proc/self/mounts";

fn read_mounts() -> Result<String> {
    fs::read_to_string(MOUNTS).map_err(|e| XocopyError::message(format!("read {}: {}", MOUNTS, e)))
}

pub fn parse_mounts(contents: &str) -> Vec<(PathBuf, PathBuf)> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mountpoint = fields.next()?;
            Some((PathBuf::from(device), PathBuf::from(unescape(mountpoint))))
        })
        .collect()
}

// the kernel escapes blanks in mountpoints as octal
fn unescape(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

pub fn mountpoint_in(contents: &str, device: &Path) -> Option<PathBuf> {
    let device_real = device.canonicalize().unwrap_or_else(|_| device.to_path_buf());
    parse_mounts(contents).into_iter().find_map(|(mounted, mountpoint)| {
        let mounted_real = mounted.canonicalize().unwrap_or_else(|_| mounted.clone());
        (mounted_real == device_real).then_some(mountpoint)
    })
}

pub fn find_device_mountpoint(device: &Path) -> Result<Option<PathBuf>> {
    Ok(mountpoint_in(&read_mounts()?, device))
}

pub fn mountpoint_is_mounted(mountpoint: &Path) -> Result<bool> {
    let contents = read_mounts()?;
    Ok(parse_mounts(&contents)
        .iter()
        .any(|(_, mounted)| mounted == mountpoint))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
/dev/sda1 / ext4 rw,relatime 0 0
/dev/sdq1 /volumeUSB1/usbshare vfat rw 0 0
gocryptfs /tmp/crypto\\040dir fuse.gocryptfs rw 0 0
";

    #[test]
    fn parses_device_and_mountpoint() {
        let mounts = parse_mounts(TABLE);
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[2].1, PathBuf::from("/tmp/crypto dir"));
    }

    #[test]
    fn finds_mountpoint_of_device() {
        assert_eq!(
            mountpoint_in(TABLE, Path::new("/dev/sdq1")),
            Some(PathBuf::from("/volumeUSB1/usbshare"))
        );
        assert_eq!(mountpoint_in(TABLE, Path::new("/dev/sdz1")), None);
    }
}
