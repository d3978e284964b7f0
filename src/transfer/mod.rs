pub mod cipher;

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use indicatif::ProgressBar;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

use crate::error::{Result, XocopyError};
use crate::types::TransferKind;
use crate::util::paths::list_entries;

pub use cipher::ChunkCipher;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub const TEMP_PREFIX: &str = ".xocopy-";

fn temp_file_in(dir: &Path) -> Result<NamedTempFile> {
    Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| XocopyError::message(format!("create temp file in {}: {}", dir.display(), e)))
}

pub fn remove_stale_temp_files(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for name in list_entries(dir)? {
        if !name.starts_with(TEMP_PREFIX) {
            continue;
        }
        let path = dir.join(&name);
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                warn!("removed stale partial transfer {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("remove {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    PlainCopy,
    EncryptedCopy,
}

impl From<TransferKind> for TransferStrategy {
    fn from(kind: TransferKind) -> Self {
        match kind {
            TransferKind::Plain => TransferStrategy::PlainCopy,
            TransferKind::Encrypted => TransferStrategy::EncryptedCopy,
        }
    }
}

impl TransferStrategy {
    pub fn prepare(&self) -> Result<PreparedTransfer> {
        let cipher = match self {
            TransferStrategy::PlainCopy => None,
            TransferStrategy::EncryptedCopy => Some(ChunkCipher::generate()?),
        };
        Ok(PreparedTransfer { cipher })
    }
}

pub struct PreparedTransfer {
    cipher: Option<ChunkCipher>,
}

impl PreparedTransfer {
    pub fn key(&self) -> Option<&str> {
        self.cipher.as_ref().map(ChunkCipher::key)
    }

    pub fn output_len(&self, source_len: u64, chunk_size: usize) -> u64 {
        match self.cipher {
            None => source_len,
            Some(_) => cipher::sealed_file_len(source_len, chunk_size),
        }
    }

    pub fn stream<R: Read>(&self, reader: R, chunk_size: usize) -> ChunkStream<'_, R> {
        ChunkStream {
            reader,
            chunk_size: chunk_size.max(1),
            cipher: self.cipher.as_ref(),
            done: false,
        }
    }

    pub fn write_file(
        &self,
        source: &Path,
        destination: &Path,
        chunk_size: usize,
        bar: &ProgressBar,
    ) -> Result<u64> {
        let dir = destination.parent().ok_or_else(|| {
            XocopyError::message(format!("{} has no parent directory", destination.display()))
        })?;
        let input = File::open(source)
            .map_err(|e| XocopyError::message(format!("open {}: {}", source.display(), e)))?;
        let mut tmp = temp_file_in(dir)?;

        let mut written = 0u64;
        for chunk in self.stream(input, chunk_size) {
            let chunk = chunk
                .map_err(|e| XocopyError::message(format!("read {}: {}", source.display(), e)))?;
            tmp.write_all(&chunk.bytes).map_err(|e| {
                XocopyError::message(format!("write {}: {}", destination.display(), e))
            })?;
            written += chunk.bytes.len() as u64;
            bar.inc(chunk.consumed as u64);
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| XocopyError::message(format!("sync {}: {}", destination.display(), e)))?;
        tmp.persist(destination).map_err(|e| {
            XocopyError::message(format!("rename into {}: {}", destination.display(), e.error))
        })?;
        debug!("wrote {} bytes to {}", written, destination.display());
        Ok(written)
    }
}

#[derive(Debug)]
pub struct Chunk {
    pub consumed: usize,
    pub bytes: Vec<u8>,
}

pub struct ChunkStream<'a, R> {
    reader: R,
    chunk_size: usize,
    cipher: Option<&'a ChunkCipher>,
    done: bool,
}

impl<'a, R: Read> ChunkStream<'a, R> {
    fn fill(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

impl<'a, R: Read> Iterator for ChunkStream<'a, R> {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let plain = match self.fill() {
            Ok(plain) => plain,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        if plain.len() < self.chunk_size {
            self.done = true;
        }
        if plain.is_empty() {
            return None;
        }
        let consumed = plain.len();
        let bytes = match self.cipher {
            Some(cipher) => cipher.seal(&plain),
            None => plain,
        };
        Some(Ok(Chunk { consumed, bytes }))
    }
}

pub fn decrypt_file(
    cipher: &ChunkCipher,
    source: &Path,
    destination: &Path,
    bar: &ProgressBar,
) -> Result<u64> {
    let dir = destination.parent().ok_or_else(|| {
        XocopyError::message(format!("{} has no parent directory", destination.display()))
    })?;
    let input = File::open(source)
        .map_err(|e| XocopyError::message(format!("open {}: {}", source.display(), e)))?;
    let mut tmp = temp_file_in(dir)?;

    let mut written = 0u64;
    for item in cipher::DecryptStream::new(cipher, BufReader::new(input)) {
        let (consumed, plain) = item.map_err(|reason| crate::error::RecoverError::Corrupt {
            path: source.to_path_buf(),
            reason,
        })?;
        tmp.write_all(&plain)
            .map_err(|e| XocopyError::message(format!("write {}: {}", destination.display(), e)))?;
        written += plain.len() as u64;
        bar.inc(consumed as u64);
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| XocopyError::message(format!("sync {}: {}", destination.display(), e)))?;
    tmp.persist(destination).map_err(|e| {
        XocopyError::message(format!("rename into {}: {}", destination.display(), e.error))
    })?;
    Ok(written)
}
