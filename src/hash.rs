use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

pub fn hash_file_with_progress<F>(path: &Path, on_progress: F) -> io::Result<String>
where
    F: FnMut(u64),
{
    let file = File::open(path)?;
    hash_reader(file, on_progress)
}

pub fn hash_reader<R, F>(mut reader: R, mut on_progress: F) -> io::Result<String>
where
    R: Read,
    F: FnMut(u64),
{
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buffer[..read]);
        total += read as u64;
        on_progress(total);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
