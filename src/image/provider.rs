//! Generation provider trait.

use crate::error::Result;
use crate::image::content::{Content, FileRef, ResponseChunk};
use crate::image::types::ImageFormat;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::path::Path;

/// Lazily pulled chunks of one streamed generation response.
///
/// Dropping the stream abandons the underlying connection.
pub type ChunkStream = BoxStream<'static, Result<ResponseChunk>>;

/// Trait for multimodal generation services the relay forwards to.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Registers a local file with the service and returns its reference.
    async fn upload_file(&self, path: &Path, format: ImageFormat) -> Result<FileRef>;

    /// Starts a streamed generation over the given conversation.
    async fn stream_generate(&self, contents: Vec<Content>) -> Result<ChunkStream>;

    /// Model identifier used for generation.
    fn model(&self) -> &str;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    /// Checks if the provider is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}
