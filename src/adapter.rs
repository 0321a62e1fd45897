//! Translation between conversation history and the generation API's
//! content parts, and extraction of the single result image.

use crate::conversation::{HistoryEntry, Turn};
use crate::error::{RelayError, Result};
use crate::image::{
    ChunkStream, Content, FileRef, GeneratedImage, GenerationMetadata, ImageFormat, Part,
};
use base64::Engine;
use futures_util::StreamExt;

/// Builds the ordered content list for one generation.
///
/// The uploaded image and the current prompt come first as a single user
/// turn. Prior history follows in its original order; entries that cannot
/// be converted are skipped.
pub fn build_contents(file: &FileRef, prompt: &str, history: &[HistoryEntry]) -> Vec<Content> {
    let mut contents = Vec::with_capacity(history.len() + 1);
    contents.push(Content::user(vec![Part::file(file), Part::text(prompt)]));

    for (index, entry) in history.iter().enumerate() {
        match entry.to_turn() {
            Some(turn) => contents.push(turn_content(&turn)),
            None => tracing::debug!(index, role = ?entry.role, "skipping malformed history entry"),
        }
    }

    contents
}

fn turn_content(turn: &Turn) -> Content {
    match turn {
        Turn::User { content } => Content::user(vec![Part::text(content.as_str())]),
        Turn::Model { image } => {
            let mime_type = ImageFormat::from_magic_bytes(image)
                .unwrap_or_default()
                .mime_type();
            Content::model(vec![Part::inline(
                mime_type,
                base64::engine::general_purpose::STANDARD.encode(image),
            )])
        }
    }
}

/// Pulls chunks until one carries inline image data and returns that image.
///
/// Text-only chunks are ignored. The rest of the stream is dropped
/// unconsumed once an image is found.
pub async fn first_image(mut chunks: ChunkStream, model: &str) -> Result<GeneratedImage> {
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;

        if let Some(message) = chunk.block_message() {
            return Err(RelayError::ContentBlocked(message));
        }

        if let Some(blob) = chunk.inline_image() {
            let data = base64::engine::general_purpose::STANDARD
                .decode(blob.data.as_bytes())
                .map_err(|e| RelayError::Decode(e.to_string()))?;
            if data.is_empty() {
                return Err(RelayError::GenerationEmpty);
            }
            let format = ImageFormat::from_magic_bytes(&data)
                .or_else(|| ImageFormat::from_mime_type(&blob.mime_type))
                .unwrap_or_default();
            return Ok(GeneratedImage::new(
                data,
                format,
                GenerationMetadata {
                    model: Some(model.to_string()),
                    duration_ms: None,
                },
            ));
        }

        if let Some(text) = chunk.text() {
            tracing::trace!(%text, "ignoring text chunk");
        }
    }

    Err(RelayError::GenerationEmpty)
}
