//! Core image types shared by the relay, the provider and the chat client.

use crate::error::{RelayError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format. Only ever produced by the generation service.
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Returns true if base images may be uploaded in this format.
    pub fn is_uploadable(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Parses a MIME type such as `image/png` (parameters are ignored).
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// The base image a user uploaded for editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// Original file name, forwarded as the multipart file name.
    pub file_name: String,
    /// Declared format.
    pub format: ImageFormat,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

impl SourceImage {
    /// Creates a source image with an explicit format.
    pub fn new(file_name: impl Into<String>, format: ImageFormat, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            format,
            data,
        }
    }

    /// Loads a PNG or JPEG from disk, detecting the format from the
    /// extension and falling back to magic bytes.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Self::from_file(path, data)
    }

    /// Builds an image from bytes already read from `path`, with the same
    /// detection and checks as [`SourceImage::load`].
    pub fn from_file(path: &Path, data: Vec<u8>) -> Result<Self> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .ok_or_else(|| {
                RelayError::InvalidRequest(format!(
                    "cannot determine image type of {}",
                    path.display()
                ))
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("upload.{}", format.extension()));

        let image = Self::new(file_name, format, data);
        image.validate()?;
        Ok(image)
    }

    /// Checks the upload constraints: non-empty, PNG or JPEG.
    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(RelayError::InvalidRequest("uploaded image is empty".into()));
        }
        if !self.format.is_uploadable() {
            return Err(RelayError::InvalidRequest(format!(
                "unsupported media type {}; upload a JPEG or PNG",
                self.format.mime_type()
            )));
        }
        Ok(())
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
}

/// A generated image with its data and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "generated image should be saved or processed"]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(data: Vec<u8>, format: ImageFormat, metadata: GenerationMetadata) -> Self {
        Self {
            data,
            format,
            metadata,
        }
    }

    /// Creates a generated image, detecting the format from magic bytes
    /// and falling back to PNG.
    pub fn from_bytes(data: Vec<u8>, metadata: GenerationMetadata) -> Self {
        let format = ImageFormat::from_magic_bytes(&data).unwrap_or_default();
        Self::new(data, format, metadata)
    }

    /// Decodes a base64 payload received from the relay.
    pub fn from_base64(encoded: &str, metadata: GenerationMetadata) -> Result<Self> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| RelayError::Decode(e.to_string()))?;
        if data.is_empty() {
            return Err(RelayError::UnexpectedResponse(
                "relay returned an empty image".into(),
            ));
        }
        Ok(Self::from_bytes(data, metadata))
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Saves the image to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}
