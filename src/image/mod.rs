//! Image types, the generation API content model, and providers.

pub mod content;
mod provider;
pub mod providers;
mod types;

pub use content::{Content, ContentRole, FileRef, Part, ResponseChunk};
pub use provider::{ChunkStream, GenerationProvider};
pub use types::{GeneratedImage, GenerationMetadata, ImageFormat, SourceImage};
