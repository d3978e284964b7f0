use std::io::BufRead;

use fernet::Fernet;

use crate::error::{Result, XocopyError};

const TOKEN_OVERHEAD: u64 = 1 + 8 + 16 + 32;
const BLOCK: u64 = 16;

pub struct ChunkCipher {
    fernet: Fernet,
    key: String,
}

impl ChunkCipher {
    /// Fresh random key; never reused across files.
    pub fn generate() -> Result<Self> {
        Self::from_key(&Fernet::generate_key())
    }

    pub fn from_key(key: &str) -> Result<Self> {
        let fernet = Fernet::new(key)
            .ok_or_else(|| XocopyError::message("invalid encryption key".to_string()))?;
        Ok(Self {
            fernet,
            key: key.to_string(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn seal(&self, chunk: &[u8]) -> Vec<u8> {
        let mut token = self.fernet.encrypt(chunk).into_bytes();
        token.push(b'\n');
        token
    }

    pub fn open(&self, token: &str) -> std::result::Result<Vec<u8>, String> {
        self.fernet
            .decrypt(token)
            .map_err(|_| "token failed authentication".to_string())
    }
}

/// Size of one sealed chunk, newline included.
pub fn sealed_len(plain_len: u64) -> u64 {
    let raw = TOKEN_OVERHEAD + (plain_len / BLOCK + 1) * BLOCK;
    (raw + 2) / 3 * 4 + 1
}

/// Encoded size of a whole file of `len` bytes sealed in `chunk_size` pieces.
pub fn sealed_file_len(len: u64, chunk_size: usize) -> u64 {
    let chunk = chunk_size.max(1) as u64;
    let full = len / chunk;
    let rest = len % chunk;
    let mut total = full * sealed_len(chunk);
    if rest > 0 {
        total += sealed_len(rest);
    }
    total
}

/// Yields the plaintext of each token line of `reader`.
pub struct DecryptStream<'a, R> {
    cipher: &'a ChunkCipher,
    reader: R,
    line: String,
    line_no: usize,
    done: bool,
}

impl<'a, R: BufRead> DecryptStream<'a, R> {
    pub fn new(cipher: &'a ChunkCipher, reader: R) -> Self {
        Self {
            cipher,
            reader,
            line: String::new(),
            line_no: 0,
            done: false,
        }
    }

    fn next_token(&mut self) -> Option<std::result::Result<(usize, Vec<u8>), String>> {
        loop {
            self.line.clear();
            let read = match self.reader.read_line(&mut self.line) {
                Ok(read) => read,
                Err(err) => return Some(Err(format!("read: {}", err))),
            };
            if read == 0 {
                return None;
            }
            self.line_no += 1;
            let token = self.line.trim_end();
            if token.is_empty() {
                continue;
            }
            return Some(
                self.cipher
                    .open(token)
                    .map(|plain| (read, plain))
                    .map_err(|reason| format!("line {}: {}", self.line_no, reason)),
            );
        }
    }
}

impl<'a, R: BufRead> Iterator for DecryptStream<'a, R> {
    /// (encrypted bytes consumed, plaintext chunk)
    type Item = std::result::Result<(usize, Vec<u8>), String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.next_token();
        if matches!(item, None | Some(Err(_))) {
            self.done = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn sealed_len_matches_token_size() {
        let cipher = ChunkCipher::generate().unwrap();
        for len in [0usize, 1, 15, 16, 17, 100, 4096] {
            let sealed = cipher.seal(&vec![7u8; len]);
            assert_eq!(sealed.len() as u64, sealed_len(len as u64), "len {}", len);
        }
    }

    #[test]
    fn keys_are_fresh() {
        let a = ChunkCipher::generate().unwrap();
        let b = ChunkCipher::generate().unwrap();
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn decrypts_token_lines() {
        let cipher = ChunkCipher::generate().unwrap();
        let mut sealed = cipher.seal(b"hello ");
        sealed.extend(cipher.seal(b"world"));
        let plain: Vec<u8> = DecryptStream::new(&cipher, Cursor::new(sealed))
            .flat_map(|item| item.unwrap().1)
            .collect();
        assert_eq!(plain, b"hello world");
    }

    #[test]
    fn wrong_key_is_rejected() {
        let cipher = ChunkCipher::generate().unwrap();
        let other = ChunkCipher::generate().unwrap();
        let sealed = cipher.seal(b"data");
        let mut stream = DecryptStream::new(&other, Cursor::new(sealed));
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
        assert!(ChunkCipher::from_key("not-a-key").is_err());
    }
}
