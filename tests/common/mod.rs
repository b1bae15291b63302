#![allow(dead_code)]

use bytes::Bytes;
use image::{ImageBuffer, ImageFormat, Rgb};
use std::{
    io::Cursor,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tiered_image_store::{
    models::{
        image::{ImageAsset, ImageInfo, ResizeBounds},
        object::{CannedAcl, StorageClass},
    },
    services::{
        codec::{CodecError, ImageCodec, fit_within},
        image_store::{ImageStore, UploadRequest},
        memory::{InMemoryArchiveTier, InMemoryObjectTier},
    },
};

pub const ORIGINALS: &str = "originals";
pub const ORIGINALS_URL: &str = "http://cdn.test/originals/";
pub const RESIZED: &str = "resized";
pub const RESIZED_URL: &str = "http://cdn.test/resized/";
pub const VAULT: &str = "photos";

/// Codec that records calls and emits a textual "rendition" of its input.
#[derive(Debug, Default)]
pub struct CountingCodec {
    resizes: AtomicUsize,
    last_input: Mutex<Option<Vec<u8>>>,
}

impl CountingCodec {
    pub fn resize_calls(&self) -> usize {
        self.resizes.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<Vec<u8>> {
        self.last_input.lock().unwrap().clone()
    }
}

impl ImageCodec for CountingCodec {
    fn inspect(&self, bytes: &[u8]) -> Result<ImageInfo, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::UnknownFormat);
        }
        Ok(ImageInfo {
            content_type: "image/png".into(),
            width: 640,
            height: 480,
        })
    }

    fn resize(&self, bytes: &[u8], bounds: ResizeBounds) -> Result<ImageAsset, CodecError> {
        self.resizes.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(bytes.to_vec());

        let (width, height) = fit_within(640, 480, bounds);
        let body = format!("{}x{}:{}", width, height, String::from_utf8_lossy(bytes));
        Ok(ImageAsset::new(
            body.into_bytes(),
            ImageInfo {
                content_type: "image/jpeg".into(),
                width,
                height,
            },
        ))
    }
}

pub struct Harness {
    pub store: ImageStore,
    pub objects: Arc<InMemoryObjectTier>,
    pub archive: Arc<InMemoryArchiveTier>,
}

pub fn harness(archive: InMemoryArchiveTier) -> Harness {
    let objects = Arc::new(InMemoryObjectTier::new());
    let archive = Arc::new(archive);
    Harness {
        store: ImageStore::new(objects.clone(), archive.clone()),
        objects,
        archive,
    }
}

pub fn original_request(key: &str, vault: Option<&str>) -> UploadRequest {
    UploadRequest {
        bucket: ORIGINALS.into(),
        bucket_url: ORIGINALS_URL.into(),
        object_key: key.into(),
        storage_class: StorageClass::Standard,
        acl: CannedAcl::Private,
        archive_vault: vault.map(str::to_string),
    }
}

pub fn png_asset(body: &'static [u8]) -> ImageAsset {
    ImageAsset::new(
        Bytes::from_static(body),
        ImageInfo {
            content_type: "image/png".into(),
            width: 640,
            height: 480,
        },
    )
}

/// A real PNG for the raster codec.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([20u8, 120, 220]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
