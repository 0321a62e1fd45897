//! HTTP front of the relay.
//!
//! `POST /generate-image/` takes a multipart form with `file`, `prompt` and
//! an optional JSON `history`, and answers `{"image_base64": ...}` or
//! `{"detail": ...}`.

use crate::conversation::parse_history;
use crate::error::RelayError;
use crate::image::{ImageFormat, SourceImage};
use crate::relay::{GenerationRequest, Relay};
use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Default upload size limit.
pub const DEFAULT_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Listener settings for the relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub addr: SocketAddr,
    /// Maximum accepted request body, in bytes.
    pub body_limit: usize,
    /// Directory uploads are staged in; the system temp dir when unset.
    pub staging_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            body_limit: DEFAULT_BODY_LIMIT,
            staging_dir: None,
        }
    }
}

/// Success body of `POST /generate-image/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    /// The generated image, base64-encoded.
    pub image_base64: String,
}

/// Error body of every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable failure description.
    pub detail: String,
}

/// Builds the relay router.
pub fn router(relay: Arc<Relay>, body_limit: usize) -> Router {
    Router::new()
        .route("/generate-image/", post(generate_image))
        .route("/generate-image", post(generate_image))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}

/// Binds and serves until the process is stopped.
pub async fn serve(config: ServerConfig, relay: Relay) -> std::io::Result<()> {
    let relay = match config.staging_dir {
        Some(dir) => relay.with_staging_dir(dir),
        None => relay,
    };
    if !relay.is_configured() {
        tracing::warn!("no API key configured; every generation request will fail");
    }

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "relay listening");
    axum::serve(listener, router(Arc::new(relay), config.body_limit)).await
}

/// A relay failure rendered as `{"detail": ...}`.
struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self(RelayError::InvalidRequest(format!("malformed form: {}", err.body_text())))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = match &self.0 {
            RelayError::Config(_) | RelayError::InvalidRequest(_) => self.0.to_string(),
            other => format!("Image generation failed: {}", other),
        };
        if status.is_server_error() {
            tracing::error!(%detail, "generation request failed");
        } else {
            tracing::debug!(%detail, "rejected generation request");
        }
        (status, Json(ErrorBody { detail })).into_response()
    }
}

async fn health(State(relay): State<Arc<Relay>>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "configured": relay.is_configured() }))
}

async fn generate_image(
    State(relay): State<Arc<Relay>>,
    multipart: Multipart,
) -> Result<Json<RelayResponse>, ApiError> {
    let request = read_form(multipart).await?;
    let image = relay.generate(&request).await?;
    Ok(Json(RelayResponse {
        image_base64: image.to_base64(),
    }))
}

async fn read_form(mut multipart: Multipart) -> Result<GenerationRequest, ApiError> {
    let mut image = None;
    let mut prompt = None;
    let mut history = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => image = Some(read_image(field).await?),
            Some("prompt") => prompt = Some(field.text().await?),
            Some("history") => history = parse_history(&field.text().await?)?,
            other => tracing::debug!(field = ?other, "ignoring unknown form field"),
        }
    }

    let image = image.ok_or_else(|| RelayError::InvalidRequest("missing form field: file".into()))?;
    let prompt =
        prompt.ok_or_else(|| RelayError::InvalidRequest("missing form field: prompt".into()))?;

    Ok(GenerationRequest::new(image, prompt).with_history(history))
}

/// Reads the uploaded file, trusting the declared media type and sniffing
/// the bytes only when none (or a generic one) was declared.
async fn read_image(field: Field<'_>) -> Result<SourceImage, ApiError> {
    let declared = field.content_type().map(str::to_string);
    let file_name = field.file_name().unwrap_or("upload").to_string();
    let data = field.bytes().await?.to_vec();

    let format = match declared.as_deref() {
        None | Some("application/octet-stream") => ImageFormat::from_magic_bytes(&data),
        Some(mime) => ImageFormat::from_mime_type(mime),
    }
    .filter(ImageFormat::is_uploadable)
    .ok_or_else(|| {
        RelayError::InvalidRequest(format!(
            "unsupported media type {}; upload a JPEG or PNG",
            declared.as_deref().unwrap_or("(unknown)")
        ))
    })?;

    Ok(SourceImage::new(file_name, format, data))
}
