//! Cold-tier client interface.
//!
//! Uploads are synchronous. Reads go through jobs that the tier completes on
//! its own schedule; callers initiate a job, poll it, then fetch its output.

use crate::{
    models::archive::{JobOutput, JobParameters, RetrievalJob},
    services::error::TierResult,
};
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait ArchiveTier: Send + Sync {
    /// Store `body` in `vault` and return the archive id.
    ///
    /// `tree_hash` is checked by the tier against the received bytes.
    async fn upload_archive(
        &self,
        vault: &str,
        description: &str,
        body: Bytes,
        tree_hash: &str,
    ) -> TierResult<String>;

    /// Start a retrieval job and return its id.
    async fn initiate_job(&self, vault: &str, parameters: JobParameters) -> TierResult<String>;

    async fn list_jobs(&self, vault: &str) -> TierResult<Vec<RetrievalJob>>;

    async fn describe_job(&self, vault: &str, job_id: &str) -> TierResult<Option<RetrievalJob>>;

    /// Output of a succeeded job. Fails with `JobNotReady` while it is running.
    async fn get_job_output(&self, vault: &str, job_id: &str) -> TierResult<Option<JobOutput>>;

    async fn check_ready(&self) -> TierResult<()> {
        Ok(())
    }
}
