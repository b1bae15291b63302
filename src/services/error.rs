//! Error taxonomy shared by the tier clients and the orchestrators.

use crate::{
    models::upload::{FailureKind, UploadFailure},
    services::{codec::CodecError, integrity::IntegrityMismatch, keys::MalformedKey},
};
use std::io;
use thiserror::Error;

/// Failures raised by a hot- or cold-tier backend.
///
/// Absence is never one of these: backends return `Option` for lookups.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("vault name `{0}` invalid: 1-255 letters, digits, `_`, `-` or `.`")]
    InvalidVaultName(String),
    #[error("archive `{0}` not found")]
    ArchiveNotFound(String),
    #[error("job `{0}` not found")]
    JobNotFound(String),
    #[error("job `{0}` has not completed")]
    JobNotReady(String),
    #[error("content digest mismatch: expected {expected}, computed {computed}")]
    BadDigest { expected: String, computed: String },
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("{0}")]
    Transport(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type TierResult<T> = Result<T, TierError>;

/// Errors inside an orchestration step, before they are folded into an outcome.
#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    IntegrityMismatch(#[from] IntegrityMismatch),
    #[error(transparent)]
    MalformedKey(#[from] MalformedKey),
    #[error("store fault: {0}")]
    StoreFault(#[from] TierError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ImageStoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ImageStoreError::NotFound(_) => FailureKind::NotFound,
            ImageStoreError::IntegrityMismatch(_) => FailureKind::IntegrityMismatch,
            ImageStoreError::MalformedKey(_)
            | ImageStoreError::StoreFault(
                TierError::InvalidObjectKey(_) | TierError::InvalidBucketName { .. },
            ) => FailureKind::MalformedKey,
            ImageStoreError::StoreFault(
                TierError::ArchiveNotFound(_) | TierError::JobNotFound(_),
            ) => FailureKind::NotFound,
            ImageStoreError::StoreFault(_) => FailureKind::StoreFault,
            ImageStoreError::Codec(_) => FailureKind::Codec,
        }
    }

    pub fn into_failure(self) -> UploadFailure {
        UploadFailure::new(self.kind(), self.to_string())
    }
}

pub type ImageStoreResult<T> = Result<T, ImageStoreError>;
