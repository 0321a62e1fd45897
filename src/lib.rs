#![warn(missing_docs)]
//! ImageChat - conversational image editing over Gemini.
//!
//! A user loads one base image and sends edit instructions one at a time.
//! Each instruction is relayed to Gemini together with the earlier turns of
//! the conversation, and the first image the model streams back becomes the
//! next turn.
//!
//! # Quick Start - Relay
//!
//! ```no_run
//! use imagechat::{GeminiProvider, GenerationRequest, Relay, SourceImage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> imagechat::Result<()> {
//!     let provider = GeminiProvider::builder().build()?;
//!     let relay = Relay::new(Arc::new(provider));
//!
//!     let image = SourceImage::load("cat.png")?;
//!     let request = GenerationRequest::new(image, "make it wear a hat");
//!     let edited = relay.generate(&request).await?;
//!     edited.save("cat-hat.png")?;
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - Server
//!
//! ```no_run
//! use imagechat::server::{serve, ServerConfig};
//! use imagechat::{GeminiProvider, Relay};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let relay = match GeminiProvider::builder().build() {
//!         Ok(provider) => Relay::new(Arc::new(provider)),
//!         Err(_) => Relay::unconfigured(),
//!     };
//!     serve(ServerConfig::default(), relay).await
//! }
//! ```
//!
//! # Features
//!
//! - `cli`: the `imagechat` binary (server, terminal chat, one-shot edit)

mod error;

pub mod adapter;
pub mod chat;
pub mod client;
pub mod conversation;
pub mod image;
pub mod relay;
pub mod server;

#[cfg(test)]
mod test_support;

// Re-export error types at crate root
pub use error::{RelayError, Result};

pub use chat::ChatLoop;
pub use client::RelayClient;
pub use conversation::{History, HistoryEntry, Phase, Role, Session, Turn};
pub use image::providers::{GeminiModel, GeminiProvider, GeminiProviderBuilder, GenerationConfig};
pub use image::{
    GeneratedImage, GenerationMetadata, GenerationProvider, ImageFormat, SourceImage,
};
pub use relay::{GenerationRequest, ImageEditor, Relay};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{RelayError, Result};
    pub use crate::conversation::{Session, Turn};
    pub use crate::image::providers::GeminiProvider;
    pub use crate::image::{GeneratedImage, GenerationProvider, SourceImage};
    pub use crate::relay::{GenerationRequest, ImageEditor, Relay};
}
