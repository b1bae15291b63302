mod common;

use bytes::Bytes;
use common::*;
use tiered_image_store::{
    models::upload::FailureKind,
    services::{
        archive_tier::ArchiveTier,
        error::{ImageStoreError, TierError},
        integrity::tree_hash,
        memory::InMemoryArchiveTier,
        object_tier::ObjectTier,
        recovery::{ArchiveRecovery, RecoverySettings, RecoveryState},
    },
};

const KEY: &str = "ab12cd34/2024-01-01T00-00-00/cat.png";

fn recovery(h: &Harness) -> ArchiveRecovery {
    ArchiveRecovery::new(
        h.store.clone(),
        RecoverySettings {
            vault: VAULT.into(),
            original_bucket: ORIGINALS.into(),
            original_bucket_url: ORIGINALS_URL.into(),
        },
    )
}

async fn archived(h: &Harness) -> String {
    let outcome = h
        .store
        .upload_image(original_request(KEY, Some(VAULT)), png_asset(b"original"))
        .await;
    outcome.archive_id().expect("archived").to_string()
}

#[tokio::test]
async fn pending_job_resumes_and_restores_original() {
    let h = harness(InMemoryArchiveTier::new());
    let archive_id = archived(&h).await;
    let recovery = recovery(&h);

    let state = recovery.drive(RecoveryState::Idle { archive_id }).await;
    let job_id = match &state {
        RecoveryState::JobPending { job_id } => job_id.clone(),
        other => panic!("expected JobPending, got {:?}", other),
    };

    // still running: polling again does not advance
    let state = recovery.drive(state).await;
    assert_eq!(state.name(), "job_pending");

    h.archive.complete_job(&job_id);
    let outcome = match recovery.drive(state).await {
        RecoveryState::Restored(outcome) => outcome,
        other => panic!("expected Restored, got {:?}", other),
    };

    assert_eq!(outcome.object_key(), KEY);
    assert_eq!(
        outcome.location().unwrap(),
        format!("{}{}", ORIGINALS_URL, KEY)
    );
    assert!(outcome.archive_id().is_none());
    assert_eq!(h.objects.version_count(ORIGINALS, KEY), 2);
    assert_eq!(h.archive.archive_count(), 1);

    let restored = h.objects.get(ORIGINALS, KEY, None).await.unwrap().unwrap();
    assert_eq!(restored.body.as_bytes().as_ref(), b"original");
    assert_eq!(restored.content_type.as_deref(), Some("image/png"));
    assert_eq!((restored.width(), restored.height()), (Some(640), Some(480)));
}

#[tokio::test]
async fn flow_resumes_from_a_job_id() {
    let h = harness(InMemoryArchiveTier::auto_completing());
    let archive_id = archived(&h).await;
    let recovery = recovery(&h);

    let job_id = match recovery.initiate(&archive_id).await {
        RecoveryState::JobInitiated { job_id } => job_id,
        other => panic!("expected JobInitiated, got {:?}", other),
    };

    let state = recovery.advance(RecoveryState::resume(&job_id)).await;
    assert_eq!(state.name(), "job_ready");
    let state = recovery.advance(state).await;
    match &state {
        RecoveryState::Recovered { descriptor, .. } => {
            assert_eq!(descriptor.object_key, KEY);
            assert_eq!(descriptor.content_type, "image/png");
        }
        other => panic!("expected Recovered, got {:?}", other),
    }
    let state = recovery.advance(state).await;
    assert!(matches!(state, RecoveryState::Restored(_)));
    assert!(state.is_terminal());
}

#[tokio::test]
async fn failed_job_ends_in_failed_state() {
    let h = harness(InMemoryArchiveTier::new());
    let archive_id = archived(&h).await;
    let recovery = recovery(&h);

    let state = recovery.drive(RecoveryState::Idle { archive_id }).await;
    let job_id = state.job_id().unwrap().to_string();
    h.archive.fail_job(&job_id, "vault unavailable");

    match recovery.drive(state).await {
        RecoveryState::Failed { job_id: failed, failure } => {
            assert_eq!(failed.as_deref(), Some(job_id.as_str()));
            assert_eq!(failure.kind, FailureKind::StoreFault);
            assert_eq!(failure.message, "vault unavailable");
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(h.objects.version_count(ORIGINALS, KEY), 1);
}

#[tokio::test]
async fn unknown_archive_fails_before_any_job() {
    let h = harness(InMemoryArchiveTier::new());
    let recovery = recovery(&h);

    match recovery
        .drive(RecoveryState::Idle {
            archive_id: "missing".into(),
        })
        .await
    {
        RecoveryState::Failed { job_id, failure } => {
            assert!(job_id.is_none());
            assert_eq!(failure.kind, FailureKind::NotFound);
        }
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let h = harness(InMemoryArchiveTier::new());
    let recovery = recovery(&h);

    match recovery.drive(RecoveryState::resume("nope")).await {
        RecoveryState::Failed { failure, .. } => assert_eq!(failure.kind, FailureKind::NotFound),
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn descriptor_without_restore_hints_uses_defaults() {
    let h = harness(InMemoryArchiveTier::auto_completing());
    let body = Bytes::from_static(b"legacy");
    let description =
        r#"{"ObjectKey":"legacy/2019-05-05T10-00-00/dog.jpg","ContentType":"image/jpeg","Width":10,"Height":20}"#;
    let archive_id = h
        .archive
        .upload_archive(VAULT, description, body.clone(), &tree_hash(&body))
        .await
        .unwrap();

    let recovery = recovery(&h);
    match recovery.drive(RecoveryState::Idle { archive_id }).await {
        RecoveryState::Restored(outcome) => {
            assert_eq!(outcome.object_key(), "legacy/2019-05-05T10-00-00/dog.jpg");
        }
        other => panic!("expected Restored, got {:?}", other),
    }

    let restored = h
        .objects
        .get(ORIGINALS, "legacy/2019-05-05T10-00-00/dog.jpg", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!((restored.width(), restored.height()), (Some(10), Some(20)));
}

#[tokio::test]
async fn unreadable_descriptor_fails_restore() {
    let h = harness(InMemoryArchiveTier::auto_completing());
    let body = Bytes::from_static(b"payload");
    let archive_id = h
        .archive
        .upload_archive(VAULT, "not json", body.clone(), &tree_hash(&body))
        .await
        .unwrap();

    let recovery = recovery(&h);
    match recovery.drive(RecoveryState::Idle { archive_id }).await {
        RecoveryState::Failed { failure, .. } => assert_eq!(failure.kind, FailureKind::StoreFault),
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(h.objects.put_count(), 0);
}

#[tokio::test]
async fn inventory_lists_archived_uploads() {
    let h = harness(InMemoryArchiveTier::auto_completing());
    let archive_id = archived(&h).await;
    let recovery = recovery(&h);

    let job_id = recovery.start_inventory().await.unwrap();
    let report = recovery.inventory(&job_id).await.unwrap();

    assert_eq!(report.vault_name, VAULT);
    assert_eq!(report.archive_list.len(), 1);
    assert_eq!(report.archive_list[0].archive_id, archive_id);
    assert_eq!(report.archive_list[0].size, b"original".len() as u64);

    let jobs = recovery.list_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, job_id);
}

#[tokio::test]
async fn inventory_before_completion_is_not_ready() {
    let h = harness(InMemoryArchiveTier::new());
    let recovery = recovery(&h);

    let job_id = recovery.start_inventory().await.unwrap();
    let err = recovery.inventory(&job_id).await.unwrap_err();
    assert!(matches!(
        err,
        ImageStoreError::StoreFault(TierError::JobNotReady(_))
    ));
}
