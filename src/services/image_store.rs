//! ImageStore: verified uploads to the hot tier with an optional archive copy.

use crate::{
    models::{
        archive::ArchiveDescriptor,
        image::ImageAsset,
        object::{CannedAcl, StorageClass},
        upload::UploadOutcome,
    },
    services::{
        archive_tier::ArchiveTier,
        error::{ImageStoreError, ImageStoreResult, TierError},
        integrity::{self, Checksum},
        object_tier::{META_HEIGHT, META_WIDTH, ObjectTier, PutObject, PutReceipt},
    },
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{error, info, warn};

/// Where and how an image should be written.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bucket: String,
    /// Public URL prefix of `bucket`; the object key is appended to it.
    pub bucket_url: String,
    pub object_key: String,
    pub storage_class: StorageClass,
    pub acl: CannedAcl,
    /// Also archive the image into this vault.
    pub archive_vault: Option<String>,
}

/// Public location of `key` under `bucket_url`.
pub fn object_location(bucket_url: &str, key: &str) -> String {
    format!("{}{}", bucket_url, key)
}

#[derive(Clone)]
pub struct ImageStore {
    objects: Arc<dyn ObjectTier>,
    archive: Arc<dyn ArchiveTier>,
}

impl ImageStore {
    pub fn new(objects: Arc<dyn ObjectTier>, archive: Arc<dyn ArchiveTier>) -> Self {
        Self { objects, archive }
    }

    pub fn objects(&self) -> &Arc<dyn ObjectTier> {
        &self.objects
    }

    pub fn archive(&self) -> &Arc<dyn ArchiveTier> {
        &self.archive
    }

    /// Write `image` to the hot tier, verify it, and archive it if asked.
    ///
    /// Never fails outright: errors end up in the returned outcome. An archive
    /// failure is attached as auxiliary information and does not undo the
    /// committed hot write.
    pub async fn upload_image(&self, request: UploadRequest, mut image: ImageAsset) -> UploadOutcome {
        let checksum = Checksum::compute(&mut image.bytes);
        image.bytes.rewind();

        let receipt = match self.put_verified(&request, &image, &checksum).await {
            Ok(receipt) => receipt,
            Err(err) => {
                error!(
                    "upload of {}/{} failed: {}",
                    request.bucket, request.object_key, err
                );
                return UploadOutcome::failed(&request.object_key, err.into_failure());
            }
        };

        info!(
            "stored {}/{} version {:?} ({} bytes)",
            request.bucket,
            request.object_key,
            receipt.version_id,
            image.bytes.len()
        );

        let outcome = UploadOutcome::stored(
            &request.object_key,
            object_location(&request.bucket_url, &request.object_key),
            receipt.version_id,
            checksum.to_etag(),
        );

        match request.archive_vault.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(vault) => match self.archive_copy(vault, &request, &mut image).await {
                Ok(archive_id) => outcome.with_archive_id(archive_id),
                Err(err) => {
                    warn!(
                        "archiving {} to vault {} failed; hot copy kept: {}",
                        request.object_key, vault, err
                    );
                    outcome.with_archive_failure(err.to_string())
                }
            },
            None => outcome,
        }
    }

    /// Put the bytes and check the returned entity tag against `checksum`.
    pub(crate) async fn put_verified(
        &self,
        request: &UploadRequest,
        image: &ImageAsset,
        checksum: &Checksum,
    ) -> ImageStoreResult<PutReceipt> {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_WIDTH.to_string(), image.width.to_string());
        metadata.insert(META_HEIGHT.to_string(), image.height.to_string());

        let receipt = self
            .objects
            .put(PutObject {
                bucket: request.bucket.clone(),
                key: request.object_key.clone(),
                storage_class: request.storage_class,
                acl: request.acl,
                content_type: image.content_type.clone(),
                metadata,
                body: image.bytes.to_bytes(),
                content_md5: checksum.to_base64(),
            })
            .await?;

        if let Err(mismatch) = integrity::verify(checksum, &receipt.etag) {
            error!(
                "integrity mismatch for {}/{}: {}",
                request.bucket, request.object_key, mismatch
            );
            return Err(ImageStoreError::IntegrityMismatch(mismatch));
        }

        Ok(receipt)
    }

    async fn archive_copy(
        &self,
        vault: &str,
        request: &UploadRequest,
        image: &mut ImageAsset,
    ) -> ImageStoreResult<String> {
        let descriptor = ArchiveDescriptor {
            object_key: request.object_key.clone(),
            content_type: image.content_type.clone(),
            width: image.width,
            height: image.height,
            storage_class: Some(request.storage_class),
            acl: Some(request.acl),
        };
        let description = serde_json::to_string(&descriptor).map_err(TierError::from)?;

        image.bytes.rewind();
        let body = image.bytes.to_bytes();
        let checksum = integrity::tree_hash(&body);

        let archive_id = self
            .archive
            .upload_archive(vault, &description, body, &checksum)
            .await?;
        info!("archived {} to vault {} as {}", request.object_key, vault, archive_id);
        Ok(archive_id)
    }
}
