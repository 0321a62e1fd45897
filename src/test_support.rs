//! In-process mock of the Gemini Files and streaming APIs for tests.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Smallest byte string recognised as a PNG.
pub(crate) const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

/// A JPEG header, used for edited results.
pub(crate) const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

/// One upload seen by the mock.
#[derive(Debug, Default, Clone)]
pub(crate) struct UploadRecord {
    pub start_command: String,
    pub content_type: String,
    pub finalize_command: String,
    pub data: Vec<u8>,
}

pub(crate) struct MockState {
    base_url: String,
    sse_body: String,
    failure: Option<(u16, String)>,
    pub uploads: Mutex<Vec<UploadRecord>>,
    pub generate_bodies: Mutex<Vec<Value>>,
    pub generate_paths: Mutex<Vec<String>>,
}

pub(crate) struct MockGemini {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockGemini {
    /// Starts a mock that answers every generation with `sse_body`.
    pub async fn start(sse_body: String) -> Self {
        Self::spawn(sse_body, None).await
    }

    /// Starts a mock whose generation endpoint fails with `status`.
    pub async fn failing(status: u16, body: &str) -> Self {
        Self::spawn(String::new(), Some((status, body.to_string()))).await
    }

    async fn spawn(sse_body: String, failure: Option<(u16, String)>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(MockState {
            base_url: base_url.clone(),
            sse_body,
            failure,
            uploads: Mutex::new(Vec::new()),
            generate_bodies: Mutex::new(Vec::new()),
            generate_paths: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/upload/v1beta/files", post(start_upload))
            .route("/resumable/:session", post(finalize_upload))
            .route("/v1beta/models/:action", post(generate).get(model_info))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { base_url, state }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn start_upload(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.uploads.lock().unwrap().push(UploadRecord {
        start_command: header_str(&headers, "x-goog-upload-command"),
        content_type: header_str(&headers, "x-goog-upload-header-content-type"),
        ..Default::default()
    });
    let upload_url = format!("{}/resumable/session-1", state.base_url);
    ([("x-goog-upload-url", upload_url)], Json(json!({}))).into_response()
}

async fn finalize_upload(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut uploads = state.uploads.lock().unwrap();
    let Some(record) = uploads.last_mut() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    record.finalize_command = header_str(&headers, "x-goog-upload-command");
    record.data = body.to_vec();
    let mime_type = record.content_type.clone();

    Json(json!({
        "file": {
            "name": "files/mock-1",
            "uri": format!("{}/v1beta/files/mock-1", state.base_url),
            "mimeType": mime_type,
            "state": "ACTIVE"
        }
    }))
    .into_response()
}

async fn generate(
    State(state): State<Arc<MockState>>,
    Path(action): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.generate_paths.lock().unwrap().push(action);
    state.generate_bodies.lock().unwrap().push(body);

    if let Some((status, text)) = &state.failure {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, text.clone()).into_response();
    }

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        state.sse_body.clone(),
    )
        .into_response()
}

async fn model_info(State(state): State<Arc<MockState>>, Path(model): Path<String>) -> Response {
    if let Some((status, text)) = &state.failure {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, text.clone()).into_response();
    }
    Json(json!({ "name": format!("models/{}", model) })).into_response()
}

/// A response chunk carrying `data` as an inline image.
pub(crate) fn image_chunk(data: &[u8]) -> Value {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "inlineData": { "mimeType": "image/png", "data": encoded } }]
            }
        }]
    })
}

/// A response chunk carrying only text.
pub(crate) fn text_chunk(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] }
        }]
    })
}

/// Encodes chunks as a server-sent event body.
pub(crate) fn sse_body(chunks: &[Value]) -> String {
    chunks
        .iter()
        .map(|c| format!("data: {}\r\n\r\n", c))
        .collect()
}
