//! HTTP client for a running relay server.

use crate::error::{sanitize_error_message, RelayError, Result};
use crate::image::{GeneratedImage, GenerationMetadata};
use crate::relay::{GenerationRequest, ImageEditor};
use crate::server::{ErrorBody, RelayResponse};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Default relay location.
pub const DEFAULT_RELAY_URL: &str = "http://localhost:8000";

/// Sends edit requests to a relay over HTTP.
pub struct RelayClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayClient {
    /// Creates a client for the relay at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(RelayError::InvalidRequest("relay URL must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/generate-image/", base),
        })
    }

    /// Full URL of the generation endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ImageEditor for RelayClient {
    async fn edit(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let start = Instant::now();

        let image_part = reqwest::multipart::Part::bytes(request.image.data.clone())
            .file_name(request.image.file_name.clone())
            .mime_str(request.image.format.mime_type())
            .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", image_part)
            .text("prompt", request.prompt.clone());

        if !request.history.is_empty() {
            form = form.text("history", serde_json::to_string(&request.history)?);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.detail)
                .unwrap_or_else(|_| sanitize_error_message(&text));
            return Err(RelayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: RelayResponse = response.json().await?;
        GeneratedImage::from_base64(
            &body.image_base64,
            GenerationMetadata {
                model: None,
                duration_ms: Some(start.elapsed().as_millis() as u64),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageFormat, SourceImage};
    use crate::test_support::PNG_BYTES;

    #[test]
    fn test_endpoint_normalization() {
        let client = RelayClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8000/generate-image/");

        let client = RelayClient::new(DEFAULT_RELAY_URL).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8000/generate-image/");

        assert!(RelayClient::new("  ").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RelayClient::new(&format!("http://{}", addr)).unwrap();
        let request = GenerationRequest::new(
            SourceImage::new("cat.png", ImageFormat::Png, PNG_BYTES.to_vec()),
            "make it wear a hat",
        );
        let result = client.edit(&request).await;
        assert!(matches!(result, Err(RelayError::Transport(_))));
    }
}
