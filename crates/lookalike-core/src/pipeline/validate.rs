//! Input validation before decoding.

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Validates uploaded bytes before they reach the decoder.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    /// Create a new validator with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Perform quick validation before full decode.
    ///
    /// Checks:
    /// - Upload size is within limits
    /// - Bytes start with a known image signature
    pub fn validate(&self, bytes: &[u8]) -> Result<(), PipelineError> {
        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if bytes.len() as u64 > max_bytes {
            return Err(PipelineError::FileTooLarge {
                size_mb: bytes.len() as u64 / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        if bytes.len() < 4 {
            return Err(PipelineError::Decode(
                "Input too small to be a valid image".to_string(),
            ));
        }

        let mut header = [0u8; 12];
        let bytes_read = bytes.len().min(header.len());
        header[..bytes_read].copy_from_slice(&bytes[..bytes_read]);

        if !Self::is_valid_image_header(&header, bytes_read) {
            return Err(PipelineError::Decode(
                "Unrecognized image format (invalid magic bytes)".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if the header bytes match known image formats.
    fn is_valid_image_header(header: &[u8; 12], bytes_read: usize) -> bool {
        if bytes_read < 4 {
            return false;
        }

        // JPEG: FF D8 FF
        if header[0] == 0xFF && header[1] == 0xD8 && header[2] == 0xFF {
            return true;
        }

        // PNG: 89 50 4E 47
        if header[0] == 0x89 && header[1] == b'P' && header[2] == b'N' && header[3] == b'G' {
            return true;
        }

        // GIF: GIF8
        if &header[..4] == b"GIF8" {
            return true;
        }

        // WebP: RIFF....WEBP
        if &header[..4] == b"RIFF" {
            return bytes_read >= 12 && &header[8..12] == b"WEBP";
        }

        // BMP: BM
        if header[0] == b'B' && header[1] == b'M' {
            return true;
        }

        // TIFF: II (little-endian) or MM (big-endian) followed by version 42
        let is_tiff_le =
            header[0] == b'I' && header[1] == b'I' && header[2] == 0x2A && header[3] == 0x00;
        let is_tiff_be =
            header[0] == b'M' && header[1] == b'M' && header[2] == 0x00 && header[3] == 0x2A;
        if is_tiff_le || is_tiff_be {
            return true;
        }

        // AVIF: ftyp box at offset 4
        bytes_read >= 12 && &header[4..8] == b"ftyp"
    }
}
