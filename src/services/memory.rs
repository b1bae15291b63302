//! In-memory tier backends for tests and local experiments.
//!
//! Thread-safe via `RwLock`. Nothing is persisted; data is lost on drop.

use crate::{
    models::{
        archive::{
            InventoryEntry, InventoryReport, JobOutput, JobParameters, JobStatus, RetrievalJob,
        },
        byte_source::ByteSource,
    },
    services::{
        archive_tier::ArchiveTier,
        error::{TierError, TierResult},
        integrity::{Checksum, tree_hash},
        object_tier::{ObjectTier, PutObject, PutReceipt, StoredObject},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct MemVersion {
    version_id: String,
    request: PutObject,
    stored: Bytes,
}

/// Versioned in-memory hot tier.
#[derive(Debug, Default)]
pub struct InMemoryObjectTier {
    objects: RwLock<HashMap<(String, String), Vec<MemVersion>>>,
    corrupt_next_put: AtomicBool,
    puts: AtomicUsize,
}

impl InMemoryObjectTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one byte of the next payload on its way into the store.
    ///
    /// The store then reports the entity tag of what it actually received,
    /// which is what a corrupting transport looks like from the client.
    pub fn corrupt_next_put(&self) {
        self.corrupt_next_put.store(true, Ordering::SeqCst);
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of versions stored under `key`.
    pub fn version_count(&self, bucket: &str, key: &str) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(bucket.to_string(), key.to_string()))
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ObjectTier for InMemoryObjectTier {
    async fn put(&self, request: PutObject) -> TierResult<PutReceipt> {
        let stored = if self.corrupt_next_put.swap(false, Ordering::SeqCst) {
            let mut bytes = request.body.to_vec();
            if let Some(first) = bytes.first_mut() {
                *first ^= 0xFF;
            } else {
                bytes.push(0);
            }
            Bytes::from(bytes)
        } else {
            let computed = Checksum::of(&request.body).to_base64();
            if computed != request.content_md5 {
                return Err(TierError::BadDigest {
                    expected: request.content_md5.clone(),
                    computed,
                });
            }
            request.body.clone()
        };

        let etag = format!("\"{}\"", Checksum::of(&stored).to_etag());
        let version_id = Uuid::new_v4().simple().to_string();

        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((request.bucket.clone(), request.key.clone()))
            .or_default()
            .push(MemVersion {
                version_id: version_id.clone(),
                request,
                stored,
            });
        self.puts.fetch_add(1, Ordering::SeqCst);

        Ok(PutReceipt {
            version_id: Some(version_id),
            etag,
        })
    }

    async fn exists(&self, bucket: &str, key: &str) -> TierResult<bool> {
        Ok(self.version_count(bucket, key) > 0)
    }

    async fn latest_version(&self, bucket: &str, key: &str) -> TierResult<Option<String>> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(bucket.to_string(), key.to_string()))
            .and_then(|versions| versions.last())
            .map(|v| v.version_id.clone()))
    }

    async fn get(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> TierResult<Option<StoredObject>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let Some(versions) = objects.get(&(bucket.to_string(), key.to_string())) else {
            return Ok(None);
        };

        let found = match version_id {
            Some(id) => versions.iter().find(|v| v.version_id == id),
            None => versions.last(),
        };

        Ok(found.map(|v| StoredObject {
            key: key.to_string(),
            version_id: Some(v.version_id.clone()),
            content_type: Some(v.request.content_type.clone()),
            etag: Checksum::of(&v.stored).to_etag(),
            metadata: v.request.metadata.clone(),
            body: ByteSource::new(v.stored.clone()),
        }))
    }
}

#[derive(Debug, Clone)]
struct MemArchive {
    vault: String,
    description: String,
    body: Bytes,
    tree_hash: String,
    created_at: DateTime<Utc>,
}

/// In-memory cold tier.
///
/// New jobs start `InProgress` unless `auto_complete` is set; tests move them
/// along with [`complete_job`](Self::complete_job) and [`fail_job`](Self::fail_job).
#[derive(Debug, Default)]
pub struct InMemoryArchiveTier {
    archives: RwLock<HashMap<String, MemArchive>>,
    jobs: RwLock<HashMap<String, RetrievalJob>>,
    auto_complete: bool,
    fail_uploads: AtomicBool,
}

impl InMemoryArchiveTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs succeed as soon as they are initiated.
    pub fn auto_completing() -> Self {
        Self {
            auto_complete: true,
            ..Self::default()
        }
    }

    /// Make every subsequent upload fail with a transport error.
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn archive_count(&self) -> usize {
        self.archives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stored description of `archive_id`.
    pub fn description(&self, archive_id: &str) -> Option<String> {
        self.archives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(archive_id)
            .map(|a| a.description.clone())
    }

    pub fn complete_job(&self, job_id: &str) {
        self.set_status(job_id, JobStatus::Succeeded, None);
    }

    pub fn fail_job(&self, job_id: &str, message: &str) {
        self.set_status(job_id, JobStatus::Failed, Some(message.to_string()));
    }

    fn set_status(&self, job_id: &str, status: JobStatus, message: Option<String>) {
        if let Some(job) = self
            .jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(job_id)
        {
            job.status = status;
            job.status_message = message;
            job.completed_at = Some(Utc::now());
        }
    }

    fn inventory(&self, vault: &str) -> TierResult<Bytes> {
        let archives = self.archives.read().unwrap_or_else(PoisonError::into_inner);
        let mut archive_list: Vec<InventoryEntry> = archives
            .iter()
            .filter(|(_, a)| a.vault == vault)
            .map(|(id, a)| InventoryEntry {
                archive_id: id.clone(),
                archive_description: a.description.clone(),
                creation_date: a.created_at,
                size: a.body.len() as u64,
                sha256_tree_hash: a.tree_hash.clone(),
            })
            .collect();
        archive_list.sort_by(|a, b| a.creation_date.cmp(&b.creation_date));

        let report = InventoryReport {
            vault_name: vault.to_string(),
            inventory_date: Utc::now(),
            archive_list,
        };
        Ok(Bytes::from(serde_json::to_vec(&report)?))
    }
}

#[async_trait]
impl ArchiveTier for InMemoryArchiveTier {
    async fn upload_archive(
        &self,
        vault: &str,
        description: &str,
        body: Bytes,
        checksum: &str,
    ) -> TierResult<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(TierError::Transport(format!("vault `{}` unavailable", vault)));
        }

        let computed = tree_hash(&body);
        if computed != checksum {
            return Err(TierError::BadDigest {
                expected: checksum.to_string(),
                computed,
            });
        }

        let archive_id = Uuid::new_v4().simple().to_string();
        self.archives
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                archive_id.clone(),
                MemArchive {
                    vault: vault.to_string(),
                    description: description.to_string(),
                    body,
                    tree_hash: computed,
                    created_at: Utc::now(),
                },
            );
        Ok(archive_id)
    }

    async fn initiate_job(&self, vault: &str, parameters: JobParameters) -> TierResult<String> {
        if let Some(archive_id) = parameters.archive_id() {
            let archives = self.archives.read().unwrap_or_else(PoisonError::into_inner);
            match archives.get(archive_id) {
                Some(a) if a.vault == vault => {}
                _ => return Err(TierError::ArchiveNotFound(archive_id.to_string())),
            }
        }

        let now = Utc::now();
        let job = RetrievalJob {
            job_id: Uuid::new_v4().simple().to_string(),
            vault: vault.to_string(),
            action: parameters.action(),
            archive_id: parameters.archive_id().map(str::to_string),
            status: if self.auto_complete {
                JobStatus::Succeeded
            } else {
                JobStatus::InProgress
            },
            status_message: None,
            created_at: now,
            completed_at: self.auto_complete.then_some(now),
        };
        let job_id = job.job_id.clone();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.clone(), job);
        Ok(job_id)
    }

    async fn list_jobs(&self, vault: &str) -> TierResult<Vec<RetrievalJob>> {
        let mut jobs: Vec<RetrievalJob> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|j| j.vault == vault)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn describe_job(&self, vault: &str, job_id: &str) -> TierResult<Option<RetrievalJob>> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .filter(|j| j.vault == vault)
            .cloned())
    }

    async fn get_job_output(&self, vault: &str, job_id: &str) -> TierResult<Option<JobOutput>> {
        let Some(job) = self.describe_job(vault, job_id).await? else {
            return Ok(None);
        };
        if !job.is_ready() {
            return Err(TierError::JobNotReady(job_id.to_string()));
        }

        match job.archive_id {
            Some(archive_id) => {
                let archives = self.archives.read().unwrap_or_else(PoisonError::into_inner);
                let archive = archives
                    .get(&archive_id)
                    .ok_or_else(|| TierError::ArchiveNotFound(archive_id.clone()))?;
                Ok(Some(JobOutput {
                    archive_description: Some(archive.description.clone()),
                    checksum: Some(archive.tree_hash.clone()),
                    body: ByteSource::new(archive.body.clone()),
                }))
            }
            None => Ok(Some(JobOutput {
                archive_description: None,
                checksum: None,
                body: ByteSource::new(self.inventory(vault)?),
            })),
        }
    }
}
