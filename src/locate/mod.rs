pub mod descriptor;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::types::BackupMode;
use crate::util::paths::list_entries;

pub use descriptor::{BackupDescriptor, ParseOutcome};
use descriptor::{is_safe_relative, read_descriptor, DESCRIPTOR_EXTENSION};

const FULL_IMAGE_EXTENSIONS: [&str; 2] = [".vhd", ".xva"];

/// One backup image to transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub source: PathBuf,
    /// Path under the destination root, mirroring the descriptor's layout.
    pub relative: PathBuf,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Artifacts(Vec<Artifact>),
    /// Delta run that links onto an earlier chain member.
    Incremental,
    ModeMismatch(String),
    Unusable(String),
}

/// Collects every descriptor under `source_root` that belongs to `job_id`.
pub fn locate(source_root: &Path, job_id: &str) -> Vec<BackupDescriptor> {
    let mut found = Vec::new();
    for entry in WalkDir::new(source_root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("walk {}: {}", source_root.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(DESCRIPTOR_EXTENSION) {
            continue;
        }
        match read_descriptor(path) {
            ParseOutcome::Descriptor(desc) if desc.job_id == job_id => found.push(desc),
            ParseOutcome::Descriptor(_) | ParseOutcome::NotDescriptor => {}
            ParseOutcome::Unreadable(reason) => {
                debug!("skip {}: {}", path.display(), reason);
            }
            ParseOutcome::Malformed(reason) => {
                warn!("skip descriptor {}: {}", path.display(), reason);
            }
        }
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    if found.is_empty() {
        info!("descriptor for jobid {} not found under {}", job_id, source_root.display());
    }
    found
}

/// Applies the mode-specific artifact policy to one descriptor.
pub fn select_artifacts(desc: &BackupDescriptor, mode: BackupMode) -> Selection {
    if BackupMode::parse(&desc.mode).ok() != Some(mode) {
        return Selection::ModeMismatch(desc.mode.clone());
    }
    match mode {
        BackupMode::Delta => select_delta(desc),
        BackupMode::Full => select_full(desc),
    }
}

fn select_delta(desc: &BackupDescriptor) -> Selection {
    match desc.is_chain_baseline() {
        None => return Selection::Unusable("descriptor lists no vdis".to_string()),
        Some(false) => return Selection::Incremental,
        Some(true) => {}
    }
    if desc.vhds.is_empty() {
        return Selection::Unusable("descriptor lists no vhds".to_string());
    }
    let mut artifacts = Vec::new();
    for (disk, vhd) in &desc.vhds {
        if !is_safe_relative(vhd) {
            return Selection::Unusable(format!(
                "vhd {} for disk {} escapes the backup dir",
                vhd, disk
            ));
        }
        let relative = PathBuf::from(vhd);
        let filename = match relative.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => return Selection::Unusable(format!("vhd {} has no file name", vhd)),
        };
        artifacts.push(Artifact {
            source: desc.dir().join(&relative),
            relative,
            filename,
        });
    }
    Selection::Artifacts(artifacts)
}

fn select_full(desc: &BackupDescriptor) -> Selection {
    let base_name = desc.base_name();
    let sibling = list_entries(desc.dir()).ok().and_then(|entries| {
        entries.into_iter().find(|name| {
            name.starts_with(&base_name)
                && FULL_IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
        })
    });
    let image = match sibling.or_else(|| desc.xva.clone()) {
        Some(image) => image,
        None => return Selection::Unusable(format!("no image found for {}", base_name)),
    };
    let image = image.trim_start_matches("./").to_string();
    if !is_safe_relative(&image) {
        return Selection::Unusable(format!("image {} escapes the backup dir", image));
    }
    let source = desc.dir().join(&image);
    let filename = match source.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => return Selection::Unusable(format!("image {} has no file name", image)),
    };
    // Image names are timestamps, so keep the VM folder to tell VMs apart.
    let relative = match desc.dir().file_name() {
        Some(vm) => Path::new(vm).join(&filename),
        None => PathBuf::from(&filename),
    };
    Selection::Artifacts(vec![Artifact {
        source,
        relative,
        filename,
    }])
}
