//! Key derivation for original uploads and their resized variants.
//!
//! Original keys look like `{prefix}/{timestamp}/{file-name}`; variant keys
//! insert `{version}/{width}x{height}` after the second segment so that the
//! same request always lands on the same key and a plain existence check is
//! enough to detect a cache hit.

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Mutex};
use thiserror::Error;

/// Length of the random hex prefix on generated keys.
pub const PREFIX_LEN: usize = 8;

/// Characters left untouched when encoding a file name into a key segment.
const FILE_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("object key `{0}` must have at least two path segments")]
pub struct MalformedKey(pub String);

/// A hierarchical object key, e.g. `ab12cd34/2024-01-01T00-00-00/cat.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredObjectKey(String);

impl StoredObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Last path segment, which for generated keys is the encoded file name.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for StoredObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoredObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for StoredObjectKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StoredObjectKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Source of random key prefixes.
///
/// Prefix collisions only affect partition spread, never correctness.
#[derive(Debug)]
pub struct KeyGenerator {
    rng: Mutex<StdRng>,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator {
    /// Generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator, mostly for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// `len` lowercase hex characters.
    pub fn random_prefix(&self, len: usize) -> String {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (0..len)
            .map(|_| char::from(HEX_DIGITS[rng.gen_range(0..16)]))
            .collect()
    }

    /// Key for a new upload.
    ///
    /// A non-blank `supplied` key is returned verbatim so callers can re-upload
    /// to the same location.
    pub fn derive_original_key(&self, file_name: &str, supplied: Option<&str>) -> StoredObjectKey {
        self.derive_original_key_at(file_name, supplied, Utc::now())
    }

    pub fn derive_original_key_at(
        &self,
        file_name: &str,
        supplied: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoredObjectKey {
        if let Some(key) = supplied.filter(|k| !k.trim().is_empty()) {
            return StoredObjectKey::new(key);
        }

        StoredObjectKey(format!(
            "{}/{}/{}",
            self.random_prefix(PREFIX_LEN),
            at.format("%Y-%m-%dT%H-%M-%S"),
            utf8_percent_encode(file_name, FILE_NAME_ENCODE_SET)
        ))
    }
}

/// Key of the `width`x`height` rendition of `version_id` of `original`.
///
/// Missing dimensions become `0`, which the resize step reads as unconstrained.
pub fn derive_variant_key(
    original: &str,
    width: Option<u32>,
    height: Option<u32>,
    version_id: &str,
) -> Result<StoredObjectKey, MalformedKey> {
    let mut segments: Vec<&str> = original.split('/').collect();
    if segments.len() < 2 {
        return Err(MalformedKey(original.to_string()));
    }

    let size = format!(
        "{}/{}x{}",
        version_id,
        width.unwrap_or(0),
        height.unwrap_or(0)
    );
    segments.insert(2, &size);

    Ok(StoredObjectKey(segments.join("/")))
}
