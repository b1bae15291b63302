//! Image codec seam: metadata extraction and downscaling.

use crate::models::image::{ImageAsset, ImageInfo, ResizeBounds};
use image::{ImageFormat, ImageReader, codecs::jpeg::JpegEncoder, imageops::FilterType};
use std::io::Cursor;
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unrecognized image data")]
    UnknownFormat,
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("codec task failed: {0}")]
    Task(String),
}

/// Decodes image attributes and produces resized renditions.
///
/// Implementations are CPU-bound and synchronous; async callers run them on
/// the blocking pool.
pub trait ImageCodec: Send + Sync {
    fn inspect(&self, bytes: &[u8]) -> Result<ImageInfo, CodecError>;

    /// Fit within `bounds`, never upscaling, preserving aspect ratio.
    fn resize(&self, bytes: &[u8], bounds: ResizeBounds) -> Result<ImageAsset, CodecError>;
}

/// Output dimensions for fitting `width`x`height` inside `bounds`.
///
/// Never exceeds the source size; each side is at least one pixel.
pub fn fit_within(width: u32, height: u32, bounds: ResizeBounds) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }

    let mut scale = 1.0_f64;
    if let Some(max_w) = bounds.width {
        scale = scale.min(max_w as f64 / width as f64);
    }
    if let Some(max_h) = bounds.height {
        scale = scale.min(max_h as f64 / height as f64);
    }
    if scale >= 1.0 {
        return (width, height);
    }

    let w = ((width as f64 * scale).round() as u32).clamp(1, width);
    let h = ((height as f64 * scale).round() as u32).clamp(1, height);
    (w, h)
}

/// Codec backed by the `image` crate; always re-encodes as JPEG.
#[derive(Debug, Clone)]
pub struct RasterCodec {
    jpeg_quality: u8,
}

impl Default for RasterCodec {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl RasterCodec {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    fn format_of(bytes: &[u8]) -> Result<ImageFormat, CodecError> {
        image::guess_format(bytes).map_err(|_| CodecError::UnknownFormat)
    }
}

impl ImageCodec for RasterCodec {
    fn inspect(&self, bytes: &[u8]) -> Result<ImageInfo, CodecError> {
        let format = Self::format_of(bytes)?;
        let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()?;

        Ok(ImageInfo {
            content_type: format.to_mime_type().to_string(),
            width,
            height,
        })
    }

    fn resize(&self, bytes: &[u8], bounds: ResizeBounds) -> Result<ImageAsset, CodecError> {
        let format = Self::format_of(bytes)?;
        let source = image::load_from_memory_with_format(bytes, format)?;

        let (width, height) = fit_within(source.width(), source.height(), bounds);
        let resized = if (width, height) == (source.width(), source.height()) {
            source
        } else {
            source.resize_exact(width, height, FilterType::Lanczos3)
        };

        let mut out = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
            encoder.encode_image(&resized.to_rgb8())?;
        }

        Ok(ImageAsset::new(
            out,
            ImageInfo {
                content_type: ImageFormat::Jpeg.to_mime_type().to_string(),
                width,
                height,
            },
        ))
    }
}
