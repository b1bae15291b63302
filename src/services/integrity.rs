//! Checksums computed before a write and compared after it.
//!
//! The hot tier reports an entity tag (hex MD5 of what it stored); the archive
//! tier takes a SHA-256 tree hash up front and rejects payloads that disagree.

use crate::models::byte_source::ByteSource;
use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256};
use std::{fmt, io::Read};
use thiserror::Error;

/// Chunk size the archive tier's tree hash is built over.
pub const TREE_HASH_CHUNK: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entity tag `{actual}` does not match locally computed `{expected}`; payload was corrupted in transit")]
pub struct IntegrityMismatch {
    pub expected: String,
    pub actual: String,
}

/// MD5 digest of a payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 16]);

impl Checksum {
    /// Hash `source` from position zero to the end.
    ///
    /// The source is left at its end; rewind it before handing it on.
    pub fn compute(source: &mut ByteSource) -> Self {
        source.rewind();
        let mut ctx = md5::Context::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            // Reads from an in-memory cursor cannot fail.
            let n = source.read(&mut buf).unwrap_or(0);
            if n == 0 {
                break;
            }
            ctx.consume(&buf[..n]);
        }
        Self(ctx.compute().0)
    }

    pub fn of(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// Lowercase hex, the form the hot tier returns as an entity tag.
    pub fn to_etag(&self) -> String {
        format!("{:x}", md5::Digest(self.0))
    }

    /// Base64, the form sent as `Content-MD5`.
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_etag())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_etag())
    }
}

/// Strip surrounding whitespace and quotes and lowercase.
pub fn normalize_etag(tag: &str) -> String {
    tag.trim().trim_matches('"').to_ascii_lowercase()
}

/// Compare what the store says it wrote against what we sent.
pub fn verify(expected: &Checksum, store_tag: &str) -> Result<(), IntegrityMismatch> {
    let expected = expected.to_etag();
    let actual = normalize_etag(store_tag);
    if expected == actual {
        Ok(())
    } else {
        Err(IntegrityMismatch { expected, actual })
    }
}

/// SHA-256 tree hash as lowercase hex.
///
/// Leaf hashes cover 1 MiB chunks; each level hashes adjacent pairs and
/// carries an odd node up unchanged until one root remains.
pub fn tree_hash(data: &[u8]) -> String {
    let mut level: Vec<[u8; 32]> = if data.is_empty() {
        vec![Sha256::digest(data).into()]
    } else {
        data.chunks(TREE_HASH_CHUNK)
            .map(|chunk| Sha256::digest(chunk).into())
            .collect()
    };

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut hasher = Sha256::new();
                    hasher.update(left);
                    hasher.update(right);
                    hasher.finalize().into()
                }
                [single] => *single,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
    }

    level[0].iter().map(|b| format!("{:02x}", b)).collect()
}
