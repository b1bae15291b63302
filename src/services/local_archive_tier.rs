//! src/services/local_archive_tier.rs
//!
//! LocalArchiveTier: a cold tier backed by SQLite for archive and job
//! records and local disk for payloads under `base_path/{vault}/{archive_id}`.
//!
//! Retrieval jobs complete on their own once `retrieval_delay` has elapsed
//! since initiation, which stands in for the hours a real archive service
//! takes. Status is settled lazily whenever a job is read.

use crate::{
    models::{
        archive::{
            InventoryEntry, InventoryReport, JobAction, JobOutput, JobParameters, JobStatus,
            RetrievalJob,
        },
        byte_source::ByteSource,
    },
    services::{
        archive_tier::ArchiveTier,
        error::{TierError, TierResult},
        integrity::tree_hash,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

const MAX_VAULT_NAME_LEN: usize = 255;

#[derive(Debug, Clone, FromRow)]
struct ArchiveRow {
    archive_id: String,
    vault: String,
    description: String,
    size_bytes: i64,
    tree_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct JobRow {
    job_id: String,
    vault: String,
    action: String,
    archive_id: Option<String>,
    status: String,
    status_message: Option<String>,
    created_at: DateTime<Utc>,
    ready_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> TierResult<RetrievalJob> {
        Ok(RetrievalJob {
            action: self.action.parse().map_err(TierError::Corrupt)?,
            status: self.status.parse().map_err(TierError::Corrupt)?,
            job_id: self.job_id,
            vault: self.vault,
            archive_id: self.archive_id,
            status_message: self.status_message,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Clone)]
pub struct LocalArchiveTier {
    pub db: Arc<SqlitePool>,
    pub base_path: PathBuf,
    retrieval_delay: Duration,
}

impl LocalArchiveTier {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, retrieval_delay: Duration) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            retrieval_delay,
        }
    }

    fn ensure_vault_name_safe(&self, vault: &str) -> TierResult<()> {
        let valid = !vault.is_empty()
            && vault.len() <= MAX_VAULT_NAME_LEN
            && vault != "."
            && vault != ".."
            && vault
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if valid {
            Ok(())
        } else {
            Err(TierError::InvalidVaultName(vault.to_string()))
        }
    }

    fn archive_path(&self, vault: &str, archive_id: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(vault);
        path.push(archive_id);
        path
    }

    async fn fetch_archive(&self, vault: &str, archive_id: &str) -> TierResult<Option<ArchiveRow>> {
        Ok(sqlx::query_as::<_, ArchiveRow>(
            "SELECT archive_id, vault, description, size_bytes, tree_hash, created_at
             FROM archives WHERE vault = ? AND archive_id = ?",
        )
        .bind(vault)
        .bind(archive_id)
        .fetch_optional(&*self.db)
        .await?)
    }

    async fn fetch_job(&self, vault: &str, job_id: &str) -> TierResult<Option<JobRow>> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT job_id, vault, action, archive_id, status, status_message,
                    created_at, ready_at, completed_at
             FROM retrieval_jobs WHERE vault = ? AND job_id = ?",
        )
        .bind(vault)
        .bind(job_id)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) => Ok(Some(self.settle(row).await?)),
            None => Ok(None),
        }
    }

    /// Mark an in-progress job succeeded once its ready time has passed.
    async fn settle(&self, mut row: JobRow) -> TierResult<JobRow> {
        let now = Utc::now();
        if row.status == JobStatus::InProgress.as_str() && now >= row.ready_at {
            sqlx::query(
                "UPDATE retrieval_jobs SET status = ?, completed_at = ?
                 WHERE job_id = ? AND status = ?",
            )
            .bind(JobStatus::Succeeded.as_str())
            .bind(now)
            .bind(&row.job_id)
            .bind(JobStatus::InProgress.as_str())
            .execute(&*self.db)
            .await?;

            debug!("job {} in vault {} completed", row.job_id, row.vault);
            row.status = JobStatus::Succeeded.as_str().to_string();
            row.completed_at = Some(now);
        }
        Ok(row)
    }

    async fn inventory(&self, vault: &str) -> TierResult<Bytes> {
        let rows = sqlx::query_as::<_, ArchiveRow>(
            "SELECT archive_id, vault, description, size_bytes, tree_hash, created_at
             FROM archives WHERE vault = ? ORDER BY created_at ASC",
        )
        .bind(vault)
        .fetch_all(&*self.db)
        .await?;

        let report = InventoryReport {
            vault_name: vault.to_string(),
            inventory_date: Utc::now(),
            archive_list: rows
                .into_iter()
                .map(|row| InventoryEntry {
                    archive_id: row.archive_id,
                    archive_description: row.description,
                    creation_date: row.created_at,
                    size: row.size_bytes.max(0) as u64,
                    sha256_tree_hash: row.tree_hash,
                })
                .collect(),
        };
        Ok(Bytes::from(serde_json::to_vec(&report)?))
    }

    /// Write through a temp file in the same directory, then rename into place.
    async fn write_archive(&self, path: &Path, data: &[u8]) -> TierResult<()> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            TierError::Io(std::io::Error::new(
                ErrorKind::Other,
                "archive path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result: std::io::Result<()> = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, path).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(TierError::Io(err));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveTier for LocalArchiveTier {
    async fn upload_archive(
        &self,
        vault: &str,
        description: &str,
        body: Bytes,
        checksum: &str,
    ) -> TierResult<String> {
        self.ensure_vault_name_safe(vault)?;

        let computed = tree_hash(&body);
        if !computed.eq_ignore_ascii_case(checksum.trim()) {
            return Err(TierError::BadDigest {
                expected: checksum.to_string(),
                computed,
            });
        }

        let archive_id = Uuid::new_v4().simple().to_string();
        let path = self.archive_path(vault, &archive_id);
        self.write_archive(&path, &body).await?;

        let inserted = sqlx::query(
            "INSERT INTO archives (archive_id, vault, description, size_bytes, tree_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&archive_id)
        .bind(vault)
        .bind(description)
        .bind(body.len() as i64)
        .bind(&computed)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        if let Err(err) = inserted {
            let _ = fs::remove_file(&path).await;
            return Err(TierError::Sqlx(err));
        }

        info!("archived {} bytes to vault {} as {}", body.len(), vault, archive_id);
        Ok(archive_id)
    }

    async fn initiate_job(&self, vault: &str, parameters: JobParameters) -> TierResult<String> {
        self.ensure_vault_name_safe(vault)?;
        if let Some(archive_id) = parameters.archive_id() {
            if self.fetch_archive(vault, archive_id).await?.is_none() {
                return Err(TierError::ArchiveNotFound(archive_id.to_string()));
            }
        }

        let job_id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO retrieval_jobs
                (job_id, vault, action, archive_id, status, status_message, created_at, ready_at, completed_at)
             VALUES (?, ?, ?, ?, ?, NULL, ?, ?, NULL)",
        )
        .bind(&job_id)
        .bind(vault)
        .bind(parameters.action().as_str())
        .bind(parameters.archive_id())
        .bind(JobStatus::InProgress.as_str())
        .bind(now)
        .bind(now + self.retrieval_delay)
        .execute(&*self.db)
        .await?;

        info!(
            "initiated {} job {} in vault {}",
            parameters.action().as_str(),
            job_id,
            vault
        );
        Ok(job_id)
    }

    async fn list_jobs(&self, vault: &str) -> TierResult<Vec<RetrievalJob>> {
        self.ensure_vault_name_safe(vault)?;
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT job_id, vault, action, archive_id, status, status_message,
                    created_at, ready_at, completed_at
             FROM retrieval_jobs WHERE vault = ? ORDER BY created_at ASC",
        )
        .bind(vault)
        .fetch_all(&*self.db)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            jobs.push(self.settle(row).await?.into_job()?);
        }
        Ok(jobs)
    }

    async fn describe_job(&self, vault: &str, job_id: &str) -> TierResult<Option<RetrievalJob>> {
        self.ensure_vault_name_safe(vault)?;
        self.fetch_job(vault, job_id)
            .await?
            .map(JobRow::into_job)
            .transpose()
    }

    async fn get_job_output(&self, vault: &str, job_id: &str) -> TierResult<Option<JobOutput>> {
        self.ensure_vault_name_safe(vault)?;
        let Some(job) = self.fetch_job(vault, job_id).await? else {
            return Ok(None);
        };
        let job = job.into_job()?;
        if !job.is_ready() {
            return Err(TierError::JobNotReady(job_id.to_string()));
        }

        match (job.action, job.archive_id) {
            (JobAction::ArchiveRetrieval, Some(archive_id)) => {
                let archive = self
                    .fetch_archive(vault, &archive_id)
                    .await?
                    .ok_or_else(|| TierError::ArchiveNotFound(archive_id.clone()))?;
                let data = match fs::read(self.archive_path(vault, &archive_id)).await {
                    Ok(data) => data,
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        return Err(TierError::ArchiveNotFound(archive_id));
                    }
                    Err(err) => return Err(TierError::Io(err)),
                };
                Ok(Some(JobOutput {
                    archive_description: Some(archive.description),
                    checksum: Some(archive.tree_hash),
                    body: ByteSource::new(data),
                }))
            }
            (JobAction::ArchiveRetrieval, None) => Err(TierError::Corrupt(format!(
                "archive retrieval job {} has no archive id",
                job_id
            ))),
            (JobAction::InventoryRetrieval, _) => Ok(Some(JobOutput {
                archive_description: None,
                checksum: None,
                body: ByteSource::new(self.inventory(vault).await?),
            })),
        }
    }

    async fn check_ready(&self) -> TierResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM retrieval_jobs")
            .fetch_one(&*self.db)
            .await?;
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    async fn tier(delay: Duration) -> (LocalArchiveTier, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::memory_pool().await.unwrap();
        (LocalArchiveTier::new(Arc::new(pool), dir.path(), delay), dir)
    }

    async fn archive(tier: &LocalArchiveTier, body: &'static [u8]) -> String {
        let body = Bytes::from_static(body);
        let hash = tree_hash(&body);
        tier.upload_archive("photos", r#"{"ObjectKey":"a/b/c"}"#, body, &hash)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn retrieval_returns_payload_and_description() {
        let (tier, _dir) = tier(Duration::zero()).await;
        let archive_id = archive(&tier, b"cold bytes").await;

        let job_id = tier
            .initiate_job("photos", JobParameters::Archive { archive_id: archive_id.clone() })
            .await
            .unwrap();
        let job = tier.describe_job("photos", &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.archive_id.as_deref(), Some(archive_id.as_str()));

        let out = tier.get_job_output("photos", &job_id).await.unwrap().unwrap();
        assert_eq!(out.body.as_bytes().as_ref(), b"cold bytes");
        assert_eq!(out.archive_description.as_deref(), Some(r#"{"ObjectKey":"a/b/c"}"#));
        assert_eq!(out.checksum, Some(tree_hash(b"cold bytes")));
    }

    #[tokio::test]
    async fn archive_payload_lands_without_temp_files() {
        let (tier, _dir) = tier(Duration::zero()).await;
        let archive_id = archive(&tier, b"cold bytes").await;

        let path = tier.archive_path("photos", &archive_id);
        assert_eq!(fs::read(&path).await.unwrap(), b"cold bytes");

        let mut entries = fs::read_dir(path.parent().unwrap()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().into_owned();
            assert!(!name.starts_with(".tmp-"), "leftover {}", name);
        }
    }

    #[tokio::test]
    async fn jobs_stay_pending_until_delay_passes() {
        let (tier, _dir) = tier(Duration::hours(4)).await;
        let archive_id = archive(&tier, b"cold bytes").await;
        let job_id = tier
            .initiate_job("photos", JobParameters::Archive { archive_id })
            .await
            .unwrap();

        let jobs = tier.list_jobs("photos").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::InProgress);
        assert!(matches!(
            tier.get_job_output("photos", &job_id).await,
            Err(TierError::JobNotReady(_))
        ));
    }

    #[tokio::test]
    async fn inventory_lists_archives() {
        let (tier, _dir) = tier(Duration::zero()).await;
        let first = archive(&tier, b"one").await;
        let second = archive(&tier, b"two!").await;

        let job_id = tier
            .initiate_job("photos", JobParameters::Inventory)
            .await
            .unwrap();
        let out = tier.get_job_output("photos", &job_id).await.unwrap().unwrap();
        let report: InventoryReport = serde_json::from_slice(out.body.as_bytes()).unwrap();

        assert_eq!(report.vault_name, "photos");
        let ids: Vec<&str> = report.archive_list.iter().map(|e| e.archive_id.as_str()).collect();
        assert!(ids.contains(&first.as_str()));
        assert!(ids.contains(&second.as_str()));
    }

    #[tokio::test]
    async fn unknown_archive_and_job() {
        let (tier, _dir) = tier(Duration::zero()).await;
        assert!(matches!(
            tier.initiate_job("photos", JobParameters::Archive { archive_id: "nope".into() })
                .await,
            Err(TierError::ArchiveNotFound(_))
        ));
        assert!(tier.describe_job("photos", "nope").await.unwrap().is_none());
        assert!(tier.get_job_output("photos", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upload_rejects_wrong_tree_hash_and_bad_vault() {
        let (tier, _dir) = tier(Duration::zero()).await;
        assert!(matches!(
            tier.upload_archive("photos", "{}", Bytes::from_static(b"x"), "00").await,
            Err(TierError::BadDigest { .. })
        ));
        assert!(matches!(
            tier.upload_archive("../up", "{}", Bytes::from_static(b"x"), &tree_hash(b"x"))
                .await,
            Err(TierError::InvalidVaultName(_))
        ));
    }
}
