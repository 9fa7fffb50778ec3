//! Content digests for downloaded payloads

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const READ_CHUNK_SIZE: usize = 1024 * 1024;

/// SHA-256 hex digest of a file
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 hex digest of an in-memory payload
pub fn bytes_digest(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Whether the file at `path` exists and hashes to `expected`
///
/// Comparison ignores ASCII case. A missing or unreadable file is not a
/// match.
pub fn matches(path: &Path, expected: &str) -> bool {
    let expected = expected.trim();
    if expected.is_empty() || !path.is_file() {
        return false;
    }
    match file_digest(path) {
        Ok(actual) => actual.eq_ignore_ascii_case(expected),
        Err(e) => {
            tracing::debug!("Could not hash {}: {}", path.display(), e);
            false
        }
    }
}
