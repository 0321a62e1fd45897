//! The upload relay: stages the base image, registers it with the
//! generation service, and returns the first generated image.

use crate::adapter;
use crate::conversation::HistoryEntry;
use crate::error::{RelayError, Result};
use crate::image::providers::MISSING_KEY_MESSAGE;
use crate::image::{GeneratedImage, GenerationProvider, SourceImage};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;

/// A request to edit the base image with one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// The uploaded base image.
    pub image: SourceImage,
    /// The instruction for this turn.
    pub prompt: String,
    /// Prior turns, oldest first.
    pub history: Vec<HistoryEntry>,
}

impl GenerationRequest {
    /// Creates a request with no history.
    pub fn new(image: SourceImage, prompt: impl Into<String>) -> Self {
        Self {
            image,
            prompt: prompt.into(),
            history: Vec::new(),
        }
    }

    /// Attaches prior turns.
    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    /// Checks the image constraints and that the prompt is not blank.
    pub fn validate(&self) -> Result<()> {
        self.image.validate()?;
        if self.prompt.trim().is_empty() {
            return Err(RelayError::InvalidRequest("prompt must not be empty".into()));
        }
        Ok(())
    }
}

/// Anything that can turn a [`GenerationRequest`] into an edited image:
/// the in-process relay or a client for a remote one.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Runs one edit.
    async fn edit(&self, request: &GenerationRequest) -> Result<GeneratedImage>;
}

/// Forwards edit requests to a generation provider.
pub struct Relay {
    provider: Option<Arc<dyn GenerationProvider>>,
    staging_dir: PathBuf,
}

impl Relay {
    /// Creates a relay backed by `provider`, staging into the system
    /// temporary directory.
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            provider: Some(provider),
            staging_dir: std::env::temp_dir(),
        }
    }

    /// Creates a relay without credentials. Every call fails with
    /// [`RelayError::Config`] before touching the network.
    pub fn unconfigured() -> Self {
        Self {
            provider: None,
            staging_dir: std::env::temp_dir(),
        }
    }

    /// Stages uploads under `dir` instead of the system temp directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Returns true if a provider is available.
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Runs one edit end to end.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| RelayError::Config(MISSING_KEY_MESSAGE.into()))?;
        request.validate()?;

        let start = Instant::now();

        // Removed when dropped, on every exit path below.
        let staged = stage_image(&self.staging_dir, &request.image)?;
        tracing::debug!(path = %staged.path().display(), bytes = request.image.data.len(), "staged upload");

        let file = provider
            .upload_file(staged.path(), request.image.format)
            .await?;
        let contents = adapter::build_contents(&file, &request.prompt, &request.history);
        let chunks = provider.stream_generate(contents).await?;
        let mut image = adapter::first_image(chunks, provider.model()).await?;

        image.metadata.duration_ms = Some(start.elapsed().as_millis() as u64);
        tracing::info!(
            model = provider.model(),
            history = request.history.len(),
            bytes = image.size(),
            duration_ms = image.metadata.duration_ms,
            "generated image"
        );
        Ok(image)
    }
}

#[async_trait]
impl ImageEditor for Relay {
    async fn edit(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        self.generate(request).await
    }
}

/// Writes the image to a uniquely named file in `dir`.
fn stage_image(dir: &Path, image: &SourceImage) -> Result<NamedTempFile> {
    let suffix = format!(".{}", image.format.extension());
    let mut file = tempfile::Builder::new()
        .prefix("imagechat-upload-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    file.write_all(&image.data)?;
    file.flush()?;
    Ok(file)
}
