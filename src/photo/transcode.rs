use std::sync::Arc;

use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};

use super::error::PhotoError;

pub const DEFAULT_MAX_EDGE: u32 = 1600;

/// Converts raw image bytes into the secondary delivery format.
///
/// Implementations are CPU-bound and synchronous; callers run them through
/// [`transcode_blocking`].
pub trait Transcoder: Send + Sync {
    fn transcode(&self, bytes: &[u8]) -> Result<Vec<u8>, PhotoError>;
}

/// Decodes JPEG, PNG or WebP and re-encodes as lossless WebP, shrinking the
/// image so its longest edge fits within `max_edge`.
#[derive(Debug, Clone, Copy)]
pub struct WebpTranscoder {
    max_edge: u32,
}

impl WebpTranscoder {
    pub fn new(max_edge: u32) -> Self {
        Self {
            max_edge: max_edge.max(1),
        }
    }

    fn fit(&self, image: DynamicImage) -> DynamicImage {
        if image.width() <= self.max_edge && image.height() <= self.max_edge {
            return image;
        }
        // `resize` keeps the aspect ratio within the bounding box.
        image.resize(self.max_edge, self.max_edge, FilterType::Triangle)
    }
}

impl Default for WebpTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EDGE)
    }
}

impl Transcoder for WebpTranscoder {
    fn transcode(&self, bytes: &[u8]) -> Result<Vec<u8>, PhotoError> {
        let image = self.fit(image::load_from_memory(bytes)?);
        let mut out = Vec::new();
        let encoder = WebPEncoder::new_lossless(&mut out);
        if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)?;
        } else {
            let rgb = image.to_rgb8();
            encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
        }
        Ok(out)
    }
}

/// Run `transcoder` on the blocking pool.
pub async fn transcode_blocking(
    transcoder: Arc<dyn Transcoder>,
    bytes: Vec<u8>,
) -> Result<Vec<u8>, PhotoError> {
    tokio::task::spawn_blocking(move || transcoder.transcode(&bytes)).await?
}
