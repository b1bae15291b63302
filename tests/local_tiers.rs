mod common;

use common::*;
use std::sync::Arc;
use tiered_image_store::{
    db,
    models::{image::ImageAsset, upload::FailureKind},
    services::{
        codec::{ImageCodec, RasterCodec},
        image_store::ImageStore,
        keys::KeyGenerator,
        local_archive_tier::LocalArchiveTier,
        local_object_tier::LocalObjectTier,
        object_tier::ObjectTier,
        recovery::{ArchiveRecovery, RecoverySettings, RecoveryState},
        resolver::{DerivedAssetResolver, ResolveOutcome, ResolverSettings, VariantRequest},
    },
};

struct LocalStack {
    _dir: tempfile::TempDir,
    objects: Arc<LocalObjectTier>,
    store: ImageStore,
}

async fn local_stack(delay: chrono::Duration) -> LocalStack {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(db::memory_pool().await.unwrap());
    let objects = Arc::new(LocalObjectTier::new(pool.clone(), dir.path().join("objects")));
    let archive = Arc::new(LocalArchiveTier::new(pool, dir.path().join("archives"), delay));
    LocalStack {
        store: ImageStore::new(objects.clone(), archive),
        objects,
        _dir: dir,
    }
}

#[tokio::test]
async fn upload_resize_and_recover_on_local_tiers() {
    let stack = local_stack(chrono::Duration::zero()).await;
    let codec = Arc::new(RasterCodec::default());

    let source = png(400, 200);
    let info = codec.inspect(&source).unwrap();
    assert_eq!((info.width, info.height), (400, 200));

    let key = KeyGenerator::with_seed(7).derive_original_key("sunset.png", None);
    let uploaded = stack
        .store
        .upload_image(
            original_request(key.as_str(), Some(VAULT)),
            ImageAsset::new(source.clone(), info),
        )
        .await;
    assert!(uploaded.is_success(), "{:?}", uploaded.failure());
    let archive_id = uploaded.archive_id().expect("archived").to_string();

    let resolver = DerivedAssetResolver::new(
        stack.store.clone(),
        codec,
        ResolverSettings {
            original_bucket: ORIGINALS.into(),
            resized_bucket: RESIZED.into(),
            resized_bucket_url: RESIZED_URL.into(),
        },
    );
    let outcome = resolver
        .resolve(VariantRequest {
            original_key: key.to_string(),
            width: Some(100),
            ..VariantRequest::default()
        })
        .await;
    let location = match outcome {
        ResolveOutcome::Created { location, .. } => location,
        other => panic!("expected Created, got {:?}", other),
    };
    let variant_key = &location[RESIZED_URL.len()..];
    let variant = stack
        .objects
        .get(RESIZED, variant_key, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(variant.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!((variant.width(), variant.height()), (Some(100), Some(50)));

    let recovery = ArchiveRecovery::new(
        stack.store.clone(),
        RecoverySettings {
            vault: VAULT.into(),
            original_bucket: ORIGINALS.into(),
            original_bucket_url: ORIGINALS_URL.into(),
        },
    );
    match recovery.drive(RecoveryState::Idle { archive_id }).await {
        RecoveryState::Restored(restored) => assert_eq!(restored.object_key(), key.as_str()),
        other => panic!("expected Restored, got {:?}", other),
    }

    let latest = stack
        .objects
        .get(ORIGINALS, key.as_str(), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.body.as_bytes().as_ref(), source.as_slice());
    assert_ne!(latest.version_id.as_deref(), uploaded.version_id());
}

#[tokio::test]
async fn delayed_retrieval_stays_pending() {
    let stack = local_stack(chrono::Duration::hours(4)).await;
    let uploaded = stack
        .store
        .upload_image(
            original_request("p/t/cat.png", Some(VAULT)),
            png_asset(b"pixels"),
        )
        .await;

    let recovery = ArchiveRecovery::new(
        stack.store.clone(),
        RecoverySettings {
            vault: VAULT.into(),
            original_bucket: ORIGINALS.into(),
            original_bucket_url: ORIGINALS_URL.into(),
        },
    );
    let state = recovery
        .drive(RecoveryState::Idle {
            archive_id: uploaded.archive_id().unwrap().to_string(),
        })
        .await;
    assert_eq!(state.name(), "job_pending");
}

#[tokio::test]
async fn dotted_file_names_upload_to_local_tier() {
    let stack = local_stack(chrono::Duration::zero()).await;
    let keys = KeyGenerator::with_seed(11);

    for name in ["holiday..jpg", "photo...png"] {
        let key = keys.derive_original_key(name, None);
        assert_eq!(key.file_name(), name);

        let uploaded = stack
            .store
            .upload_image(original_request(key.as_str(), None), png_asset(b"pixels"))
            .await;
        assert!(uploaded.is_success(), "{:?}", uploaded.failure());
        assert!(stack.objects.exists(ORIGINALS, key.as_str()).await.unwrap());
    }
}

#[tokio::test]
async fn traversal_segments_are_malformed_keys() {
    let stack = local_stack(chrono::Duration::zero()).await;
    let uploaded = stack
        .store
        .upload_image(original_request("p/t/cat.png", None), png_asset(b"pixels"))
        .await;
    assert!(uploaded.is_success());

    let resolver = DerivedAssetResolver::new(
        stack.store.clone(),
        Arc::new(CountingCodec::default()),
        ResolverSettings {
            original_bucket: ORIGINALS.into(),
            resized_bucket: RESIZED.into(),
            resized_bucket_url: RESIZED_URL.into(),
        },
    );

    let requests = [
        VariantRequest {
            original_key: "p/../cat.png".into(),
            ..VariantRequest::default()
        },
        VariantRequest {
            original_key: "p/t/cat.png".into(),
            version_id: Some("..".into()),
            ..VariantRequest::default()
        },
    ];
    for request in requests {
        match resolver.resolve(request).await {
            ResolveOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::MalformedKey),
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
