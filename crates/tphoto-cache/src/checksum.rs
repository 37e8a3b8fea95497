//! Content checksums.
//!
//! Lowercase hex SHA-256 computed over fixed 8 KB read chunks, covering the
//! whole file.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Read chunk size for file hashing.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Hash an in-memory buffer.
pub fn sha256_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Hash a file from disk.
pub fn sha256_file(path: impl AsRef<Path>) -> io::Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash a file on the blocking pool.
pub async fn sha256_file_async(path: impl Into<PathBuf>) -> io::Result<String> {
    let path = path.into();
    tokio::task::spawn_blocking(move || sha256_file(&path))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Compare two hex digests, ignoring case and surrounding whitespace.
pub fn checksums_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}
