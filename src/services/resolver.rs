//! DerivedAssetResolver: serves resized renditions, creating them on a miss.
//!
//! The resized bucket acts as a cache keyed by (original key, version, size).
//! Each call is evaluated from scratch:
//!
//! 1. resolve the version (latest when none is given)
//! 2. derive the variant key
//! 3. existence check on the variant; a hit returns its location
//! 4. fetch the original
//! 5. resize on the blocking pool
//! 6. verified write with reduced redundancy and public read
//! 7. return the variant location
//!
//! Two concurrent misses for the same variant both resize and both write; the
//! hot tier keeps the last write. There is no single-flight guard.

use crate::{
    models::{
        image::ResizeBounds,
        object::{CannedAcl, StorageClass},
        upload::UploadFailure,
    },
    services::{
        codec::{CodecError, ImageCodec},
        error::{ImageStoreError, ImageStoreResult},
        image_store::{ImageStore, UploadRequest, object_location},
        integrity::Checksum,
        keys::derive_variant_key,
    },
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Buckets the resolver reads originals from and writes variants to.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub original_bucket: String,
    pub resized_bucket: String,
    pub resized_bucket_url: String,
}

/// A request for one rendition of an original image.
#[derive(Debug, Clone, Default)]
pub struct VariantRequest {
    pub original_key: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The variant already existed.
    Cached { location: String },
    /// The variant was produced and stored by this call.
    Created {
        location: String,
        version_id: Option<String>,
    },
    NotFound,
    Failed(UploadFailure),
}

impl ResolveOutcome {
    pub fn location(&self) -> Option<&str> {
        match self {
            ResolveOutcome::Cached { location } | ResolveOutcome::Created { location, .. } => {
                Some(location)
            }
            ResolveOutcome::NotFound | ResolveOutcome::Failed(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct DerivedAssetResolver {
    store: ImageStore,
    codec: Arc<dyn ImageCodec>,
    settings: ResolverSettings,
}

impl DerivedAssetResolver {
    pub fn new(store: ImageStore, codec: Arc<dyn ImageCodec>, settings: ResolverSettings) -> Self {
        Self {
            store,
            codec,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Return the location of the requested rendition, creating it if needed.
    pub async fn resolve(&self, request: VariantRequest) -> ResolveOutcome {
        match self.try_resolve(&request).await {
            Ok(outcome) => outcome,
            Err(ImageStoreError::NotFound(key)) => {
                debug!("original {} not found", key);
                ResolveOutcome::NotFound
            }
            Err(err) => {
                error!("resolving {} failed: {}", request.original_key, err);
                ResolveOutcome::Failed(err.into_failure())
            }
        }
    }

    async fn try_resolve(&self, request: &VariantRequest) -> ImageStoreResult<ResolveOutcome> {
        let objects = self.store.objects();
        let original_bucket = &self.settings.original_bucket;

        let version_id = match request.version_id.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(version) => version.to_string(),
            None => objects
                .latest_version(original_bucket, &request.original_key)
                .await?
                .ok_or_else(|| ImageStoreError::NotFound(request.original_key.clone()))?,
        };

        let variant_key = derive_variant_key(
            &request.original_key,
            request.width,
            request.height,
            &version_id,
        )?;
        let location = object_location(&self.settings.resized_bucket_url, variant_key.as_str());

        if objects
            .exists(&self.settings.resized_bucket, variant_key.as_str())
            .await?
        {
            debug!("cache hit for {}", variant_key);
            return Ok(ResolveOutcome::Cached { location });
        }

        info!("cache miss for {}; resizing", variant_key);
        let original = objects
            .get(original_bucket, &request.original_key, Some(version_id.as_str()))
            .await?
            .ok_or_else(|| ImageStoreError::NotFound(request.original_key.clone()))?;

        let bounds = ResizeBounds::new(request.width, request.height);
        let codec = Arc::clone(&self.codec);
        let source = original.body.into_bytes();
        let mut resized = tokio::task::spawn_blocking(move || codec.resize(&source, bounds))
            .await
            .map_err(|err| CodecError::Task(err.to_string()))??;

        let upload = UploadRequest {
            bucket: self.settings.resized_bucket.clone(),
            bucket_url: self.settings.resized_bucket_url.clone(),
            object_key: variant_key.into_string(),
            storage_class: StorageClass::ReducedRedundancy,
            acl: CannedAcl::PublicRead,
            archive_vault: None,
        };
        let checksum = Checksum::compute(&mut resized.bytes);
        resized.bytes.rewind();
        let receipt = self.store.put_verified(&upload, &resized, &checksum).await?;

        Ok(ResolveOutcome::Created {
            location,
            version_id: receipt.version_id,
        })
    }
}
