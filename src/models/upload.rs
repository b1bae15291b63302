//! Result records returned by the orchestration layer.
//!
//! Orchestrators never return `Err` to their callers. They hand back an
//! outcome that is either a success or carries exactly one failure.

use serde::Serialize;
use std::fmt;

/// Category of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    IntegrityMismatch,
    MalformedKey,
    StoreFault,
    Codec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl UploadFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Result of a hot-tier write.
///
/// `failure` and the success fields (`location`, `etag`) are never both set;
/// the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive_failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<UploadFailure>,
}

impl UploadOutcome {
    /// A verified write at `location`.
    pub fn stored(
        object_key: impl Into<String>,
        location: impl Into<String>,
        version_id: Option<String>,
        etag: impl Into<String>,
    ) -> Self {
        Self {
            object_key: object_key.into(),
            location: Some(location.into()),
            version_id,
            etag: Some(etag.into()),
            archive_id: None,
            archive_failure: None,
            failure: None,
        }
    }

    pub fn failed(object_key: impl Into<String>, failure: UploadFailure) -> Self {
        Self {
            object_key: object_key.into(),
            location: None,
            version_id: None,
            etag: None,
            archive_id: None,
            archive_failure: None,
            failure: Some(failure),
        }
    }

    /// Record the archive copy of a stored object.
    pub fn with_archive_id(mut self, archive_id: impl Into<String>) -> Self {
        if self.failure.is_none() {
            self.archive_id = Some(archive_id.into());
        }
        self
    }

    /// Attach a best-effort archive failure; the hot copy stays authoritative.
    pub fn with_archive_failure(mut self, reason: impl Into<String>) -> Self {
        if self.failure.is_none() {
            self.archive_failure = Some(reason.into());
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn archive_id(&self) -> Option<&str> {
        self.archive_id.as_deref()
    }

    pub fn archive_failure(&self) -> Option<&str> {
        self.archive_failure.as_deref()
    }

    pub fn failure(&self) -> Option<&UploadFailure> {
        self.failure.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_has_no_success_fields() {
        let outcome = UploadOutcome::failed(
            "a/b/c.jpg",
            UploadFailure::new(FailureKind::IntegrityMismatch, "bad tag"),
        )
        .with_archive_id("ignored");

        assert!(!outcome.is_success());
        assert!(outcome.location().is_none());
        assert!(outcome.etag().is_none());
        assert!(outcome.archive_id().is_none());
    }

    #[test]
    fn archive_failure_keeps_hot_copy() {
        let outcome = UploadOutcome::stored("k/t/x.png", "http://h/k/t/x.png", Some("v1".into()), "abc")
            .with_archive_failure("vault offline");

        assert!(outcome.is_success());
        assert_eq!(outcome.location(), Some("http://h/k/t/x.png"));
        assert_eq!(outcome.archive_failure(), Some("vault offline"));
    }

    #[test]
    fn serializes_camel_case_without_empty_fields() {
        let outcome = UploadOutcome::stored("k/t/x.png", "loc", None, "abc");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["objectKey"], "k/t/x.png");
        assert_eq!(json["etag"], "abc");
        assert!(json.get("failure").is_none());
        assert!(json.get("versionId").is_none());
    }
}
