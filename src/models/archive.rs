//! Cold-tier records: archive descriptors, retrieval jobs and inventories.

use crate::models::{
    byte_source::ByteSource,
    object::{CannedAcl, StorageClass},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Metadata stored as the archive description next to every archived image.
///
/// Enough to rebuild the hot-tier object without consulting the hot tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveDescriptor {
    pub object_key: String,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<StorageClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<CannedAcl>,
}

impl ArchiveDescriptor {
    /// Storage class to restore with.
    pub fn restore_storage_class(&self) -> StorageClass {
        self.storage_class.unwrap_or(StorageClass::StandardIa)
    }

    /// ACL to restore with.
    pub fn restore_acl(&self) -> CannedAcl {
        self.acl.unwrap_or(CannedAcl::Private)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobAction {
    ArchiveRetrieval,
    InventoryRetrieval,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::ArchiveRetrieval => "archive-retrieval",
            JobAction::InventoryRetrieval => "inventory-retrieval",
        }
    }
}

impl FromStr for JobAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "archive-retrieval" => Ok(JobAction::ArchiveRetrieval),
            "inventory-retrieval" => Ok(JobAction::InventoryRetrieval),
            other => Err(format!("unknown job action `{}`", other)),
        }
    }
}

/// Lifecycle of a retrieval job, owned by the cold tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::InProgress => "InProgress",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InProgress" => Ok(JobStatus::InProgress),
            "Succeeded" => Ok(JobStatus::Succeeded),
            "Failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status `{}`", other)),
        }
    }
}

/// What to retrieve when initiating a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobParameters {
    Archive { archive_id: String },
    Inventory,
}

impl JobParameters {
    pub fn action(&self) -> JobAction {
        match self {
            JobParameters::Archive { .. } => JobAction::ArchiveRetrieval,
            JobParameters::Inventory => JobAction::InventoryRetrieval,
        }
    }

    pub fn archive_id(&self) -> Option<&str> {
        match self {
            JobParameters::Archive { archive_id } => Some(archive_id),
            JobParameters::Inventory => None,
        }
    }
}

/// A cold-tier asynchronous job as last reported by the tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalJob {
    pub job_id: String,
    pub vault: String,
    pub action: JobAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RetrievalJob {
    pub fn is_ready(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// Output of a completed job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// Description stored with the archive; absent for inventory jobs.
    pub archive_description: Option<String>,
    /// Tree hash of `body` as reported by the tier.
    pub checksum: Option<String>,
    pub body: ByteSource,
}

/// Vault inventory as produced by an inventory-retrieval job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryReport {
    pub vault_name: String,
    pub inventory_date: DateTime<Utc>,
    pub archive_list: Vec<InventoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryEntry {
    pub archive_id: String,
    pub archive_description: String,
    pub creation_date: DateTime<Utc>,
    pub size: u64,
    #[serde(rename = "SHA256TreeHash")]
    pub sha256_tree_hash: String,
}
