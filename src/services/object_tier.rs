//! Hot-tier client interface.

use crate::{
    models::{
        byte_source::ByteSource,
        object::{CannedAcl, StorageClass},
    },
    services::error::TierResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;

/// User metadata key holding the pixel width.
pub const META_WIDTH: &str = "width";
/// User metadata key holding the pixel height.
pub const META_HEIGHT: &str = "height";

/// A single write to the hot tier.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub storage_class: StorageClass,
    pub acl: CannedAcl,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
    pub body: Bytes,
    /// Base64 MD5 of `body`; the store rejects the write if it disagrees.
    pub content_md5: String,
}

/// What the store reports after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    /// `None` when the bucket is not versioned.
    pub version_id: Option<String>,
    /// Entity tag as returned by the store, possibly quoted.
    pub etag: String,
}

/// A fetched object, fully buffered.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub version_id: Option<String>,
    pub content_type: Option<String>,
    pub etag: String,
    pub metadata: BTreeMap<String, String>,
    pub body: ByteSource,
}

impl StoredObject {
    fn metadata_u32(&self, name: &str) -> Option<u32> {
        self.metadata.get(name).and_then(|v| v.parse().ok())
    }

    pub fn width(&self) -> Option<u32> {
        self.metadata_u32(META_WIDTH)
    }

    pub fn height(&self) -> Option<u32> {
        self.metadata_u32(META_HEIGHT)
    }
}

/// Low-level hot-tier operations, implemented by each backend.
///
/// Lookups return `Ok(None)` for absent objects or versions; `Err` is reserved
/// for transport, storage and validation faults.
#[async_trait]
pub trait ObjectTier: Send + Sync {
    /// Create a new version of `key`. Earlier versions stay addressable.
    async fn put(&self, request: PutObject) -> TierResult<PutReceipt>;

    async fn exists(&self, bucket: &str, key: &str) -> TierResult<bool>;

    async fn latest_version(&self, bucket: &str, key: &str) -> TierResult<Option<String>>;

    /// Fetch `version_id`, or the latest version when `None`.
    async fn get(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> TierResult<Option<StoredObject>>;

    /// Readiness probe. Backends without a meaningful check report ready.
    async fn check_ready(&self) -> TierResult<()> {
        Ok(())
    }
}
