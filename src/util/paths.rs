use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, XocopyError};

pub fn path_has_parent_dir(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(XocopyError::message(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        return Ok(());
    }
    fs::create_dir_all(path)
        .map_err(|e| XocopyError::message(format!("create {}: {}", path.display(), e)))
}

pub fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| XocopyError::message(format!("{} has no file name", path.display())))
}

pub fn list_entries(path: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(path)
        .map_err(|e| XocopyError::message(format!("read {}: {}", path.display(), e)))?
    {
        let entry = entry
            .map_err(|e| XocopyError::message(format!("read {}: {}", path.display(), e)))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "." || name == ".." {
            continue;
        }
        out.push(name);
    }
    out.sort();
    Ok(out)
}

pub fn resolve_under(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_dir_creates_nested() {
        let dir = TempDir::new().expect("tempdir");
        let nested = dir.path().join("a/b/c");
        ensure_dir(&nested).expect("create");
        assert!(nested.is_dir());
        ensure_dir(&nested).expect("exists");
    }

    #[test]
    fn ensure_dir_rejects_file() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("f");
        fs::write(&file, b"x").expect("write");
        assert!(ensure_dir(&file).is_err());
    }

    #[test]
    fn list_entries_sorted() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("b.vhd"), b"").expect("write");
        fs::write(dir.path().join("a.json"), b"").expect("write");
        assert_eq!(list_entries(dir.path()).unwrap(), vec!["a.json", "b.vhd"]);
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let base = Path::new("/tmp/usb");
        assert_eq!(resolve_under(base, Path::new("backup")), PathBuf::from("/tmp/usb/backup"));
        assert_eq!(resolve_under(base, Path::new("/srv/c")), PathBuf::from("/srv/c"));
        assert!(path_has_parent_dir(Path::new("a/../b")));
    }
}
