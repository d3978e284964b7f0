use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::util::paths::path_has_parent_dir;

pub const DESCRIPTOR_EXTENSION: &str = "json";

/// Per-run metadata file written next to the backup images.
#[derive(Debug, Clone)]
pub struct BackupDescriptor {
    pub path: PathBuf,
    pub job_id: String,
    pub mode: String,
    pub vdis: Map<String, Value>,
    pub vhds: Vec<(String, String)>,
    pub xva: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescriptorFile {
    #[serde(rename = "jobId")]
    job_id: String,
    mode: String,
    #[serde(default)]
    vdis: Map<String, Value>,
    #[serde(default)]
    vhds: Map<String, Value>,
    #[serde(default)]
    xva: Option<String>,
}

#[derive(Debug)]
pub enum ParseOutcome {
    Descriptor(BackupDescriptor),
    /// Valid JSON without a job id; other metadata lives in the same tree.
    NotDescriptor,
    Unreadable(String),
    /// Carries a job id but not the expected fields.
    Malformed(String),
}

pub fn parse_descriptor(path: &Path, contents: &str) -> ParseOutcome {
    let value: Value = match serde_json::from_str(contents) {
        Ok(value) => value,
        Err(err) => return ParseOutcome::Unreadable(format!("invalid json: {}", err)),
    };
    if value.get("jobId").and_then(Value::as_str).is_none() {
        return ParseOutcome::NotDescriptor;
    }
    let file: DescriptorFile = match serde_json::from_value(value) {
        Ok(file) => file,
        Err(err) => return ParseOutcome::Malformed(err.to_string()),
    };
    let mut vhds = Vec::new();
    for (disk, entry) in file.vhds {
        match entry.as_str() {
            Some(name) => vhds.push((disk, name.to_string())),
            None => return ParseOutcome::Malformed(format!("vhd entry {} is not a path", disk)),
        }
    }
    ParseOutcome::Descriptor(BackupDescriptor {
        path: path.to_path_buf(),
        job_id: file.job_id,
        mode: file.mode,
        vdis: file.vdis,
        vhds,
        xva: file.xva,
    })
}

pub fn read_descriptor(path: &Path) -> ParseOutcome {
    match fs::read_to_string(path) {
        Ok(contents) => parse_descriptor(path, &contents),
        Err(err) => ParseOutcome::Unreadable(format!("read: {}", err)),
    }
}

impl BackupDescriptor {
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// `Some(true)` when the first disk has no chain linkage, i.e. the run
    /// starts a new delta chain. `None` when the descriptor lists no disks.
    pub fn is_chain_baseline(&self) -> Option<bool> {
        let (_, first) = self.vdis.iter().next()?;
        let linked = match first.get("other_config") {
            None | Some(Value::Null) => false,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        };
        Some(!linked)
    }
}

pub fn is_safe_relative(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty() && !path.is_absolute() && !path_has_parent_dir(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> ParseOutcome {
        parse_descriptor(Path::new("/src/vm/20240101T000000Z.json"), contents)
    }

    #[test]
    fn parse_delta_descriptor() {
        let outcome = parse(
            r#"{"jobId":"J1","mode":"delta","vdis":{"d0":{}},"vhds":{"d0":"vdis/J1/a.vhd"}}"#,
        );
        let ParseOutcome::Descriptor(desc) = outcome else {
            panic!("expected descriptor");
        };
        assert_eq!(desc.job_id, "J1");
        assert_eq!(desc.mode, "delta");
        assert_eq!(desc.vhds, vec![("d0".to_string(), "vdis/J1/a.vhd".to_string())]);
        assert_eq!(desc.is_chain_baseline(), Some(true));
        assert_eq!(desc.base_name(), "20240101T000000Z");
        assert_eq!(desc.dir(), Path::new("/src/vm"));
    }

    #[test]
    fn first_disk_decides_chain_position() {
        let outcome = parse(
            r#"{"jobId":"J1","mode":"delta",
                "vdis":{"z":{"other_config":{"xo:base_delta":"abc"}},"a":{}},
                "vhds":{"z":"z.vhd"}}"#,
        );
        let ParseOutcome::Descriptor(desc) = outcome else {
            panic!("expected descriptor");
        };
        assert_eq!(desc.is_chain_baseline(), Some(false));
    }

    #[test]
    fn empty_other_config_is_baseline() {
        let outcome = parse(
            r#"{"jobId":"J1","mode":"delta","vdis":{"d0":{"other_config":{}}},"vhds":{}}"#,
        );
        let ParseOutcome::Descriptor(desc) = outcome else {
            panic!("expected descriptor");
        };
        assert_eq!(desc.is_chain_baseline(), Some(true));
    }

    #[test]
    fn json_without_job_id_is_ignored() {
        assert!(matches!(parse(r#"{"version":"2.0.0"}"#), ParseOutcome::NotDescriptor));
    }

    #[test]
    fn malformed_shapes_are_reported() {
        assert!(matches!(parse("{not json"), ParseOutcome::Unreadable(_)));
        assert!(matches!(parse(r#"{"jobId":"J1"}"#), ParseOutcome::Malformed(_)));
        assert!(matches!(
            parse(r#"{"jobId":"J1","mode":"delta","vhds":{"d0":7}}"#),
            ParseOutcome::Malformed(_)
        ));
    }

    #[test]
    fn relative_paths_must_stay_inside() {
        assert!(is_safe_relative("vdis/a.vhd"));
        assert!(!is_safe_relative("../a.vhd"));
        assert!(!is_safe_relative("/etc/passwd"));
        assert!(!is_safe_relative(""));
    }
}
