//! ArchiveRecovery: brings archived images back into the hot tier.
//!
//! Recovery is a chain of explicit states driven by the caller:
//!
//! ```text
//! Idle --initiate--> JobInitiated --poll--> JobPending | JobReady | Failed
//! JobReady --fetch--> Recovered --restore--> Restored | Failed
//! ```
//!
//! Nothing advances on a timer. The cold tier owns job progress, so a flow
//! can be resumed at any point from its job id.

use crate::{
    models::{
        archive::{ArchiveDescriptor, InventoryReport, JobParameters, JobStatus, RetrievalJob},
        byte_source::ByteSource,
        image::ImageAsset,
        upload::{FailureKind, UploadFailure, UploadOutcome},
    },
    services::{
        error::{ImageStoreError, ImageStoreResult, TierError},
        image_store::{ImageStore, UploadRequest},
        integrity::tree_hash,
    },
};
use tracing::{debug, info, warn};

/// Where restored objects are written.
#[derive(Debug, Clone)]
pub struct RecoverySettings {
    pub vault: String,
    pub original_bucket: String,
    pub original_bucket_url: String,
}

#[derive(Debug, Clone)]
pub enum RecoveryState {
    Idle { archive_id: String },
    JobInitiated { job_id: String },
    JobPending { job_id: String },
    JobReady { job_id: String },
    Recovered {
        job_id: String,
        descriptor: ArchiveDescriptor,
        payload: ByteSource,
    },
    Restored(UploadOutcome),
    Failed {
        job_id: Option<String>,
        failure: UploadFailure,
    },
}

impl RecoveryState {
    /// Pick a flow back up from a job id.
    pub fn resume(job_id: impl Into<String>) -> Self {
        RecoveryState::JobInitiated {
            job_id: job_id.into(),
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            RecoveryState::Idle { .. } => None,
            RecoveryState::JobInitiated { job_id }
            | RecoveryState::JobPending { job_id }
            | RecoveryState::JobReady { job_id }
            | RecoveryState::Recovered { job_id, .. } => Some(job_id),
            RecoveryState::Restored(_) => None,
            RecoveryState::Failed { job_id, .. } => job_id.as_deref(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecoveryState::Restored(_) | RecoveryState::Failed { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecoveryState::Idle { .. } => "idle",
            RecoveryState::JobInitiated { .. } => "job_initiated",
            RecoveryState::JobPending { .. } => "job_pending",
            RecoveryState::JobReady { .. } => "job_ready",
            RecoveryState::Recovered { .. } => "recovered",
            RecoveryState::Restored(_) => "restored",
            RecoveryState::Failed { .. } => "failed",
        }
    }

    fn failed(job_id: Option<&str>, err: ImageStoreError) -> Self {
        RecoveryState::Failed {
            job_id: job_id.map(str::to_string),
            failure: err.into_failure(),
        }
    }
}

#[derive(Clone)]
pub struct ArchiveRecovery {
    store: ImageStore,
    settings: RecoverySettings,
}

impl ArchiveRecovery {
    pub fn new(store: ImageStore, settings: RecoverySettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &RecoverySettings {
        &self.settings
    }

    /// Perform the single transition out of `state`.
    ///
    /// `JobPending` polls again; terminal states are returned unchanged.
    pub async fn advance(&self, state: RecoveryState) -> RecoveryState {
        let from = state.name();
        let next = match state {
            RecoveryState::Idle { archive_id } => self.initiate(&archive_id).await,
            RecoveryState::JobInitiated { job_id } | RecoveryState::JobPending { job_id } => {
                self.poll(&job_id).await
            }
            RecoveryState::JobReady { job_id } => self.fetch(&job_id).await,
            RecoveryState::Recovered {
                job_id,
                descriptor,
                payload,
            } => self.restore(&job_id, descriptor, payload).await,
            terminal @ (RecoveryState::Restored(_) | RecoveryState::Failed { .. }) => terminal,
        };
        debug!("recovery {} -> {}", from, next.name());
        next
    }

    /// Advance until the flow is terminal or the job is still running.
    pub async fn drive(&self, mut state: RecoveryState) -> RecoveryState {
        loop {
            state = self.advance(state).await;
            if state.is_terminal() || matches!(state, RecoveryState::JobPending { .. }) {
                return state;
            }
        }
    }

    /// Start an archive-retrieval job for `archive_id`.
    pub async fn initiate(&self, archive_id: &str) -> RecoveryState {
        match self
            .store
            .archive()
            .initiate_job(
                &self.settings.vault,
                JobParameters::Archive {
                    archive_id: archive_id.to_string(),
                },
            )
            .await
        {
            Ok(job_id) => {
                info!("retrieval job {} initiated for archive {}", job_id, archive_id);
                RecoveryState::JobInitiated { job_id }
            }
            Err(err) => RecoveryState::failed(None, err.into()),
        }
    }

    /// Ask the cold tier where `job_id` stands.
    pub async fn poll(&self, job_id: &str) -> RecoveryState {
        match self.store.archive().describe_job(&self.settings.vault, job_id).await {
            Ok(Some(job)) => match job.status {
                JobStatus::InProgress => RecoveryState::JobPending {
                    job_id: job_id.to_string(),
                },
                JobStatus::Succeeded => RecoveryState::JobReady {
                    job_id: job_id.to_string(),
                },
                JobStatus::Failed => RecoveryState::Failed {
                    job_id: Some(job_id.to_string()),
                    failure: UploadFailure::new(
                        FailureKind::StoreFault,
                        job.status_message
                            .unwrap_or_else(|| format!("job {} failed", job_id)),
                    ),
                },
            },
            Ok(None) => RecoveryState::failed(
                Some(job_id),
                TierError::JobNotFound(job_id.to_string()).into(),
            ),
            Err(err) => RecoveryState::failed(Some(job_id), err.into()),
        }
    }

    /// Download the job output and parse the descriptor stored with it.
    pub async fn fetch(&self, job_id: &str) -> RecoveryState {
        match self.fetch_inner(job_id).await {
            Ok(state) => state,
            Err(err) => RecoveryState::failed(Some(job_id), err),
        }
    }

    async fn fetch_inner(&self, job_id: &str) -> ImageStoreResult<RecoveryState> {
        let output = match self
            .store
            .archive()
            .get_job_output(&self.settings.vault, job_id)
            .await
        {
            Ok(Some(output)) => output,
            Ok(None) => return Err(TierError::JobNotFound(job_id.to_string()).into()),
            Err(TierError::JobNotReady(_)) => {
                return Ok(RecoveryState::JobPending {
                    job_id: job_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let description = output.archive_description.ok_or_else(|| {
            TierError::Corrupt(format!("job {} output carries no archive description", job_id))
        })?;
        let descriptor: ArchiveDescriptor =
            serde_json::from_str(&description).map_err(TierError::from)?;

        if let Some(expected) = output.checksum.as_deref() {
            let computed = tree_hash(output.body.as_bytes());
            if !computed.eq_ignore_ascii_case(expected) {
                return Err(TierError::BadDigest {
                    expected: expected.to_string(),
                    computed,
                }
                .into());
            }
        }

        info!(
            "recovered {} ({} bytes) from job {}",
            descriptor.object_key,
            output.body.len(),
            job_id
        );
        Ok(RecoveryState::Recovered {
            job_id: job_id.to_string(),
            descriptor,
            payload: output.body,
        })
    }

    /// Re-upload a recovered payload under its original key.
    pub async fn restore(
        &self,
        job_id: &str,
        descriptor: ArchiveDescriptor,
        payload: ByteSource,
    ) -> RecoveryState {
        let request = UploadRequest {
            bucket: self.settings.original_bucket.clone(),
            bucket_url: self.settings.original_bucket_url.clone(),
            object_key: descriptor.object_key.clone(),
            storage_class: descriptor.restore_storage_class(),
            acl: descriptor.restore_acl(),
            archive_vault: None,
        };
        let image = ImageAsset {
            bytes: payload,
            content_type: descriptor.content_type,
            width: descriptor.width,
            height: descriptor.height,
        };

        let outcome = self.store.upload_image(request, image).await;
        match outcome.failure() {
            Some(failure) => {
                warn!("restore from job {} failed: {}", job_id, failure);
                RecoveryState::Failed {
                    job_id: Some(job_id.to_string()),
                    failure: failure.clone(),
                }
            }
            None => {
                info!("restored {} from job {}", outcome.object_key(), job_id);
                RecoveryState::Restored(outcome)
            }
        }
    }

    /// Start an inventory-retrieval job for the vault.
    pub async fn start_inventory(&self) -> ImageStoreResult<String> {
        Ok(self
            .store
            .archive()
            .initiate_job(&self.settings.vault, JobParameters::Inventory)
            .await?)
    }

    pub async fn list_jobs(&self) -> ImageStoreResult<Vec<RetrievalJob>> {
        Ok(self.store.archive().list_jobs(&self.settings.vault).await?)
    }

    /// Parsed output of a completed inventory job.
    pub async fn inventory(&self, job_id: &str) -> ImageStoreResult<InventoryReport> {
        let output = self
            .store
            .archive()
            .get_job_output(&self.settings.vault, job_id)
            .await?
            .ok_or_else(|| ImageStoreError::NotFound(job_id.to_string()))?;
        Ok(serde_json::from_slice(output.body.as_bytes()).map_err(TierError::from)?)
    }
}
