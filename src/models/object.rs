//! Hot-tier object metadata: storage classes, canned ACLs and version rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Durability/cost tier an object is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    Standard,
    StandardIa,
    ReducedRedundancy,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::ReducedRedundancy => "REDUCED_REDUNDANCY",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STANDARD" => Ok(StorageClass::Standard),
            "STANDARD_IA" => Ok(StorageClass::StandardIa),
            "REDUCED_REDUNDANCY" => Ok(StorageClass::ReducedRedundancy),
            other => Err(format!("unknown storage class `{}`", other)),
        }
    }
}

/// Canned access policy applied at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CannedAcl {
    Private,
    PublicRead,
}

impl CannedAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CannedAcl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(CannedAcl::Private),
            "public-read" => Ok(CannedAcl::PublicRead),
            other => Err(format!("unknown canned acl `{}`", other)),
        }
    }
}

/// One stored version of an object in the local hot tier.
///
/// Every write inserts a new row; exactly one row per (bucket, key) carries
/// `is_latest`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectVersion {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    pub bucket: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Version identifier handed back to callers.
    pub version_id: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the stored bytes.
    pub etag: String,

    /// `STANDARD`, `STANDARD_IA` or `REDUCED_REDUNDANCY`.
    pub storage_class: String,

    /// `private` or `public-read`.
    pub acl: String,

    /// User metadata serialized as a JSON object.
    pub metadata: String,

    pub is_latest: bool,

    pub created_at: DateTime<Utc>,
}

impl ObjectVersion {
    /// Anonymous readers may fetch this version.
    pub fn is_public(&self) -> bool {
        self.acl.parse::<CannedAcl>() == Ok(CannedAcl::PublicRead)
    }
}
