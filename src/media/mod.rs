pub mod space;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{MediaError, Result};
use crate::mount::inspect::find_device_mountpoint;
use crate::mount::{MountGuard, VolumeMounter};
use crate::util::command::run_with_timeout;

pub use space::{SpaceProbe, StatvfsProbe};

const UDEVADM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub disk: PathBuf,
    pub partition: PathBuf,
    pub serial: String,
}

pub fn parse_udev_properties(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("E: "))
        .filter_map(|prop| prop.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

pub fn usb_serial(props: &HashMap<String, String>) -> Option<String> {
    let is_usb = props.get("ID_BUS").map(|bus| bus == "usb").unwrap_or(false)
        || props
            .get("SYNO_DEV_DISKPORTTYPE")
            .map(|port| port == "USB")
            .unwrap_or(false);
    if !is_usb {
        return None;
    }
    props
        .get("ID_SERIAL_SHORT")
        .or_else(|| props.get("SYNO_ATTR_SERIAL"))
        .filter(|serial| !serial.is_empty())
        .cloned()
}

fn is_whole_disk_name(name: &str) -> bool {
    name.len() > 2
        && name.starts_with("sd")
        && name[2..].chars().all(|c| c.is_ascii_lowercase())
}

pub fn list_disks(dev_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut disks = Vec::new();
    let entries = fs::read_dir(dev_dir)
        .map_err(|e| MediaError::Other(format!("read {}: {}", dev_dir.display(), e)))?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if is_whole_disk_name(&name) {
            disks.push(entry.path());
        }
    }
    disks.sort();
    Ok(disks)
}

fn query_udev(disk: &Path) -> Result<HashMap<String, String>> {
    let mut cmd = Command::new("udevadm");
    cmd.arg("info").arg("--query=all").arg(format!("--name={}", disk.display()));
    let output = run_with_timeout(&mut cmd, None, UDEVADM_TIMEOUT)
        .map_err(|e| MediaError::Other(format!("udevadm {}: {}", disk.display(), e)))?;
    if !output.success() {
        return Err(MediaError::Other(format!(
            "udevadm {} failed with exit code {}",
            disk.display(),
            output.code
        ))
        .into());
    }
    Ok(parse_udev_properties(&output.stdout))
}

fn first_partition(disk: &Path) -> PathBuf {
    let mut name = disk.as_os_str().to_os_string();
    name.push("1");
    PathBuf::from(name)
}

pub fn find_authorized_device(authorized: &[String]) -> Result<Option<UsbDevice>> {
    for disk in list_disks(Path::new("/dev"))? {
        let props = match query_udev(&disk) {
            Ok(props) => props,
            Err(err) => {
                debug!("{}", err);
                continue;
            }
        };
        let Some(serial) = usb_serial(&props) else {
            continue;
        };
        if authorized.iter().any(|allowed| allowed == &serial) {
            info!("authorized USB device {} (serial {})", disk.display(), serial);
            return Ok(Some(UsbDevice {
                partition: first_partition(&disk),
                disk,
                serial,
            }));
        }
        debug!("USB device {} serial {} is not authorized", disk.display(), serial);
    }
    Ok(None)
}

pub enum MediaMount<'a> {
    Existing(PathBuf),
    Mounted(MountGuard<'a>),
}

impl MediaMount<'_> {
    pub fn path(&self) -> &Path {
        match self {
            MediaMount::Existing(path) => path,
            MediaMount::Mounted(guard) => guard.mountpoint(),
        }
    }
}

pub fn attach<'a>(
    device: &UsbDevice,
    mountpoint: &Path,
    mounter: &'a dyn VolumeMounter,
) -> Result<MediaMount<'a>> {
    if let Some(existing) = find_device_mountpoint(&device.partition)? {
        info!(
            "{} already mounted at {}",
            device.partition.display(),
            existing.display()
        );
        return Ok(MediaMount::Existing(existing));
    }
    let guard = MountGuard::acquire(mounter, &device.partition, mountpoint, "")?;
    Ok(MediaMount::Mounted(guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SYNOLOGY: &str = "\
P: /devices/platform/usb/sdq
N: sdq
E: DEVNAME=/dev/sdq
E: SYNO_DEV_DISKPORTTYPE=USB
E: SYNO_ATTR_SERIAL=5758ABC
";

    const SATA: &str = "\
E: DEVNAME=/dev/sda
E: ID_BUS=ata
E: ID_SERIAL_SHORT=WD-123
";

    #[test]
    fn detects_usb_serials() {
        assert_eq!(usb_serial(&parse_udev_properties(SYNOLOGY)).as_deref(), Some("5758ABC"));
        assert_eq!(usb_serial(&parse_udev_properties(SATA)), None);
        let generic = "E: ID_BUS=usb\nE: ID_SERIAL_SHORT=0401\n";
        assert_eq!(usb_serial(&parse_udev_properties(generic)).as_deref(), Some("0401"));
    }

    #[test]
    fn lists_only_whole_disks() {
        let dir = TempDir::new().expect("tempdir");
        for name in ["sda", "sda1", "sdb", "sr0", "sdab", "tty1"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = list_disks(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["sda", "sdab", "sdb"]);
    }

    #[test]
    fn first_partition_appends_index() {
        assert_eq!(first_partition(Path::new("/dev/sdq")), PathBuf::from("/dev/sdq1"));
    }
}
