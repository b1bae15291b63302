//! Shared handler state.

use crate::{
    config::AppConfig,
    services::{
        codec::ImageCodec,
        image_store::ImageStore,
        keys::KeyGenerator,
        local_object_tier::LocalObjectTier,
        recovery::{ArchiveRecovery, RecoverySettings},
        resolver::{DerivedAssetResolver, ResolverSettings},
    },
};
use std::sync::Arc;

/// Upload target for originals.
#[derive(Debug, Clone)]
pub struct OriginalsSettings {
    pub bucket: String,
    pub bucket_url: String,
    pub vault: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: ImageStore,
    pub resolver: DerivedAssetResolver,
    /// Present only when a vault is configured.
    pub recovery: Option<ArchiveRecovery>,
    pub codec: Arc<dyn ImageCodec>,
    pub keys: Arc<KeyGenerator>,
    pub originals: OriginalsSettings,
    /// Hot tier served under `/objects`; absent for remote tiers.
    pub public_objects: Option<LocalObjectTier>,
}

impl AppState {
    /// Wire the services together from configuration.
    pub fn new(cfg: &AppConfig, store: ImageStore, codec: Arc<dyn ImageCodec>) -> Self {
        let resolver = DerivedAssetResolver::new(
            store.clone(),
            Arc::clone(&codec),
            ResolverSettings {
                original_bucket: cfg.original_bucket.clone(),
                resized_bucket: cfg.resized_bucket.clone(),
                resized_bucket_url: cfg.resized_bucket_url.clone(),
            },
        );
        let recovery = cfg.vault_name.as_ref().map(|vault| {
            ArchiveRecovery::new(
                store.clone(),
                RecoverySettings {
                    vault: vault.clone(),
                    original_bucket: cfg.original_bucket.clone(),
                    original_bucket_url: cfg.original_bucket_url.clone(),
                },
            )
        });

        Self {
            store,
            resolver,
            recovery,
            codec,
            keys: Arc::new(KeyGenerator::new()),
            originals: OriginalsSettings {
                bucket: cfg.original_bucket.clone(),
                bucket_url: cfg.original_bucket_url.clone(),
                vault: cfg.vault_name.clone(),
            },
            public_objects: None,
        }
    }

    pub fn with_public_objects(mut self, tier: LocalObjectTier) -> Self {
        self.public_objects = Some(tier);
        self
    }
}
