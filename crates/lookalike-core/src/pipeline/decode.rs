//! Image decoding with format detection, validation, and timeout support.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::time::Duration;
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Image decoder with configurable limits and timeout.
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// Result of decoding an image.
#[derive(Debug)]
pub struct DecodedImage {
    /// The decoded image, already converted to 3-channel RGB
    pub image: DynamicImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Upload size in bytes
    pub file_size: u64,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode an image from an in-memory byte buffer with validation and timeout.
    ///
    /// Decoding runs on the blocking pool so large images do not stall the
    /// request-accepting threads.
    pub async fn decode_from_bytes<B>(&self, bytes: B) -> Result<DecodedImage, PipelineError>
    where
        B: AsRef<[u8]> + Send + 'static,
    {
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);

        let decode_result = timeout(timeout_duration, async {
            tokio::task::spawn_blocking(move || Self::decode_bytes_sync(bytes.as_ref())).await
        })
        .await;

        match decode_result {
            Ok(Ok(Ok(decoded))) => {
                if decoded.width > self.limits.max_image_dimension
                    || decoded.height > self.limits.max_image_dimension
                {
                    return Err(PipelineError::ImageTooLarge {
                        width: decoded.width,
                        height: decoded.height,
                        max_dim: self.limits.max_image_dimension,
                    });
                }
                Ok(decoded)
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(e)) => Err(PipelineError::Decode(format!("Task join error: {}", e))),
            Err(_) => Err(PipelineError::Timeout {
                stage: "decode".to_string(),
                timeout_ms: self.limits.decode_timeout_ms,
            }),
        }
    }

    /// Synchronous decode from bytes (runs in spawn_blocking).
    pub fn decode_bytes_sync(bytes: &[u8]) -> Result<DecodedImage, PipelineError> {
        use std::io::Cursor;

        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode(format!("Cannot detect image format: {}", e)))?;
        let format = reader
            .format()
            .ok_or_else(|| PipelineError::UnsupportedFormat("unknown".to_string()))?;
        let image = reader
            .decode()
            .map_err(|e| PipelineError::Decode(e.to_string()))?;

        let (width, height) = image.dimensions();
        // Canonical color mode for both the hasher and the extractor.
        let image = DynamicImage::ImageRgb8(image.to_rgb8());

        Ok(DecodedImage {
            image,
            format,
            width,
            height,
            file_size: bytes.len() as u64,
        })
    }
}

/// Lowercase file extension for an image format, used for blob keys.
pub fn format_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Avif => "avif",
        _ => "bin",
    }
}
