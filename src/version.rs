//! Content-derived version tokens.
//!
//! `sha` is the durable token callers compare across hosts and processes.
//! `etag` is a shorter weak tag salted with the path, for cache validation.

use serde::Serialize;
use sha2::{Digest, Sha256};

const ETAG_HEX_LEN: usize = 16;

/// Hex SHA-256 of the content.
pub fn sha(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Weak tag over SHA-256(content ‖ path ‖ len(content)), truncated to 16 hex chars.
pub fn etag(content: &[u8], path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.update(path.as_bytes());
    hasher.update(content.len().to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("W/\"{}\"", &digest[..ETAG_HEX_LEN])
}

pub fn validate_etag(etag: &str, current: &str) -> bool {
    etag.as_bytes() == current.as_bytes()
}

/// The pair of tokens describing one observed version of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileVersion {
    pub sha: String,
    pub etag: String,
}

impl FileVersion {
    pub fn of(content: &[u8], path: &str) -> Self {
        Self {
            sha: sha(content),
            etag: etag(content, path),
        }
    }

    /// A caller may present either token it was handed on read.
    pub fn matches(&self, token: &str) -> bool {
        let token = token.trim();
        validate_etag(token, &self.sha) || validate_etag(token, &self.etag)
    }
}
