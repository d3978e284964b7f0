use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{RecoverError, Result, XocopyError};
use crate::ledger::Ledger;
use crate::transfer::{decrypt_file, ChunkCipher};
use crate::util::paths::file_name;
use crate::util::progress::byte_bar;

pub fn recover(
    ledger: &Ledger,
    encrypted_path: &Path,
    destination_dir: &Path,
    progress: bool,
) -> Result<PathBuf> {
    let filename = file_name(encrypted_path)?;
    let key = ledger
        .lookup_encryption_key(&filename)?
        .ok_or_else(|| RecoverError::NotFound(filename.clone()))?;
    if !destination_dir.is_dir() {
        return Err(RecoverError::DestinationMissing(destination_dir.to_path_buf()).into());
    }
    let size = fs::metadata(encrypted_path)
        .map_err(|e| XocopyError::message(format!("stat {}: {}", encrypted_path.display(), e)))?
        .len();

    let output = destination_dir.join(&filename);
    if same_file(encrypted_path, &output)? {
        return Err(RecoverError::SameFile(encrypted_path.to_path_buf()).into());
    }

    let cipher = ChunkCipher::from_key(&key)?;
    let bar = byte_bar(size, &format!("Decrypting ({})", filename), progress);
    let written = decrypt_file(&cipher, encrypted_path, &output, &bar)?;
    bar.finish_and_clear();
    info!("recovered {} ({} bytes) to {}", filename, written, output.display());
    Ok(output)
}

fn same_file(encrypted_path: &Path, output: &Path) -> Result<bool> {
    if !output.exists() {
        return Ok(false);
    }
    let canonical = |path: &Path| {
        fs::canonicalize(path)
            .map_err(|e| XocopyError::message(format!("resolve {}: {}", path.display(), e)))
    };
    Ok(canonical(encrypted_path)? == canonical(output)?)
}
