//! In-memory image payloads and the attributes read from them.

use crate::models::byte_source::ByteSource;
use serde::{Deserialize, Serialize};

/// Attributes the codec extracts from encoded image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub content_type: String,
    pub width: u32,
    pub height: u32,
}

/// Encoded image bytes plus their attributes.
///
/// Owned by whichever step is currently working on it; an upload consumes it.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub bytes: ByteSource,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
}

impl ImageAsset {
    pub fn new(bytes: impl Into<ByteSource>, info: ImageInfo) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: info.content_type,
            width: info.width,
            height: info.height,
        }
    }

    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            content_type: self.content_type.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

/// Target box for a resize; `None` leaves that dimension unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResizeBounds {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ResizeBounds {
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        // A zero bound is the same as no bound.
        Self {
            width: width.filter(|w| *w > 0),
            height: height.filter(|h| *h > 0),
        }
    }
}
