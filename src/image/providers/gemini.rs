//! Gemini (Google) image editing provider.
//!
//! Uploads the base image through the Files API resumable protocol and
//! streams `streamGenerateContent` responses as server-sent events.

use crate::error::{sanitize_error_message, RelayError, Result};
use crate::image::content::{Content, FileRef, ResponseChunk};
use crate::image::provider::{ChunkStream, GenerationProvider};
use crate::image::types::ImageFormat;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Message returned when no API key can be resolved.
pub(crate) const MISSING_KEY_MESSAGE: &str = "GEMINI_API_KEY environment variable must be set";

/// Environment variables consulted for the API key, in order.
const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "API_KEY", "GOOGLE_API_KEY"];

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Gemini 2.0 Flash experimental image generation.
    #[default]
    FlashExpImageGeneration,
    /// Nano Banana - Gemini 2.5 Flash Image.
    NanoBanana,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlashExpImageGeneration => "gemini-2.0-flash-exp-image-generation",
            Self::NanoBanana => "gemini-2.5-flash-image",
        }
    }
}

/// Sampling and output settings sent with every generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Maximum tokens in the response.
    pub max_output_tokens: u32,
    /// Requested output modalities.
    pub response_modalities: Vec<String>,
    /// MIME type of text output.
    pub response_mime_type: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
            response_mime_type: "text/plain".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

fn default_safety_settings() -> Vec<SafetySetting> {
    vec![SafetySetting {
        category: "HARM_CATEGORY_CIVIC_INTEGRITY".to_string(),
        threshold: "OFF".to_string(),
    }]
}

/// Builder for GeminiProvider.
#[derive(Debug, Clone)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    api_base: Option<String>,
    model: GeminiModel,
    config: GenerationConfig,
    timeout: Duration,
}

impl Default for GeminiProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            model: GeminiModel::default(),
            config: GenerationConfig::default(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GEMINI_API_KEY`, then `API_KEY`,
    /// then `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL. Falls back to `GEMINI_API_BASE`.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Replaces the generation settings.
    pub fn generation_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the overall timeout for a single API call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    ///
    /// Fails with [`RelayError::Config`] when no key is available.
    pub fn build(self) -> Result<GeminiProvider> {
        let api_key = resolve_api_key(self.api_key, |var| std::env::var(var).ok())
            .ok_or_else(|| RelayError::Config(MISSING_KEY_MESSAGE.into()))?;

        let api_base = self
            .api_base
            .or_else(|| std::env::var("GEMINI_API_BASE").ok())
            .map(|b| b.trim().trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        Ok(GeminiProvider {
            client,
            api_key,
            api_base,
            model: self.model,
            config: self.config,
            safety_settings: default_safety_settings(),
        })
    }
}

/// Picks the explicit key when non-empty, otherwise the first non-empty
/// variable from [`API_KEY_VARS`].
fn resolve_api_key(
    explicit: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    explicit
        .filter(|k| !k.trim().is_empty())
        .or_else(|| {
            API_KEY_VARS
                .iter()
                .filter_map(|var| lookup(var))
                .find(|k| !k.trim().is_empty())
        })
        .map(|k| k.trim().to_string())
}

/// Gemini image editing provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: GeminiModel,
    config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    async fn upload_impl(&self, path: &Path, format: ImageFormat) -> Result<FileRef> {
        let data = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("upload.{}", format.extension()));

        // Resumable protocol: open a session, then upload and finalize in one go.
        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.api_base))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len())
            .header("X-Goog-Upload-Header-Content-Type", format.mime_type())
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;

        let status = start.status();
        if !status.is_success() {
            let text = start.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text));
        }

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                RelayError::UnexpectedResponse("Files API did not return an upload URL".into())
            })?;

        let finalize = self
            .client
            .post(&upload_url)
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await?;

        let status = finalize.status();
        if !status.is_success() {
            let text = finalize.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text));
        }

        let uploaded: UploadResponse = finalize.json().await?;
        tracing::debug!(file = %uploaded.file.uri, name = %uploaded.file.name, "uploaded base image");
        Ok(uploaded.file)
    }

    async fn stream_impl(&self, contents: Vec<Content>) -> Result<ChunkStream> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.api_base,
            self.model.as_str(),
        );

        let body = StreamRequest {
            contents: &contents,
            generation_config: &self.config,
            safety_settings: &self.safety_settings,
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text));
        }

        tracing::debug!(model = self.model.as_str(), turns = contents.len(), "streaming generation");
        Ok(sse_chunks(response.bytes_stream()))
    }
}

fn parse_error(status: u16, text: &str) -> RelayError {
    let text = sanitize_error_message(text);
    match status {
        401 | 403 => return RelayError::Auth(text),
        404 => {
            return RelayError::Api {
                status,
                message: format!("Model or file not found: {}", text),
            }
        }
        429 => {
            return RelayError::Api {
                status,
                message: format!("Rate limited: {}", text),
            }
        }
        _ => {}
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        return RelayError::ContentBlocked(text);
    }
    RelayError::Api {
        status,
        message: text,
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    async fn upload_file(&self, path: &Path, format: ImageFormat) -> Result<FileRef> {
        self.upload_impl(path, format).await
    }

    async fn stream_generate(&self, contents: Vec<Content>) -> Result<ChunkStream> {
        self.stream_impl(contents).await
    }

    fn model(&self) -> &str {
        self.model.as_str()
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/v1beta/models/{}", self.api_base, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(RelayError::Auth("Invalid API key".into())),
            s if !(200..300).contains(&s) => Err(RelayError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequest<'a> {
    contents: &'a [Content],
    generation_config: &'a GenerationConfig,
    safety_settings: &'a [SafetySetting],
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileRef,
}

/// Turns a server-sent event byte stream into parsed response chunks.
///
/// Each `data:` line carries one JSON chunk. Lines may be split across
/// reads and may end in CRLF.
fn sse_chunks<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<RelayError> + Send + 'static,
{
    let reader = SseReader {
        bytes: bytes.boxed(),
        buffer: Vec::new(),
        finished: false,
    };
    stream::unfold(reader, |mut reader| async move {
        let item = reader.next_chunk().await?;
        Some((item, reader))
    })
    .boxed()
}

struct SseReader<B, E> {
    bytes: BoxStream<'static, std::result::Result<B, E>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl<B: AsRef<[u8]>, E: Into<RelayError>> SseReader<B, E> {
    async fn next_chunk(&mut self) -> Option<Result<ResponseChunk>> {
        loop {
            if let Some(line) = self.take_line() {
                let line = match std::str::from_utf8(&line) {
                    Ok(line) => line,
                    Err(e) => {
                        return Some(Err(RelayError::Decode(format!(
                            "event stream is not UTF-8: {}",
                            e
                        ))))
                    }
                };
                let Some(payload) = line.trim_end().strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim();
                if payload.is_empty() || payload == "[DONE]" {
                    continue;
                }
                return Some(serde_json::from_str(payload).map_err(RelayError::from));
            }

            if self.finished {
                return None;
            }

            match self.bytes.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Some(Err(e.into()));
                }
                None => {
                    self.finished = true;
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                    }
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        Some(self.buffer.drain(..=end).collect())
    }
}
