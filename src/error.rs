//! Error types for the relay, the provider and the chat client.

/// Errors that can occur while relaying an image edit.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Required credential is missing. Never retried.
    #[error("{0}")]
    Config(String),

    /// API key rejected by the generation service.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The response stream finished without an inline image.
    #[error("no image was produced by the generation service")]
    GenerationEmpty,

    /// Prompt or output was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters (bad upload, empty prompt, bad history).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Response did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Network or HTTP error.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (staging file, saving output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// HTTP status the relay endpoint answers with for this error.
    ///
    /// Malformed input is the caller's fault; every backend failure is a
    /// server fault.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            _ => 500,
        }
    }

    /// Returns true for a missing credential.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Maximum length of an upstream error message surfaced to callers.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Condenses an upstream error body into a short human-readable message.
///
/// Google APIs wrap errors as `{"error": {"message": ...}}`; when the body
/// has that shape only the message is kept. Anything else is trimmed and
/// truncated.
pub(crate) fn sanitize_error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    if message.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        return message;
    }
    let truncated: String = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code() {
        assert_eq!(RelayError::InvalidRequest("empty prompt".into()).status_code(), 400);
        assert_eq!(RelayError::GenerationEmpty.status_code(), 500);
        assert_eq!(RelayError::Config("missing key".into()).status_code(), 500);
        assert_eq!(
            RelayError::Api {
                status: 404,
                message: "gone".into()
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::Api {
            status: 404,
            message: "Not found".into(),
        };
        assert_eq!(err.to_string(), "API error: 404 - Not found");

        let err = RelayError::Config("GEMINI_API_KEY environment variable must be set".into());
        assert_eq!(
            err.to_string(),
            "GEMINI_API_KEY environment variable must be set"
        );
        assert!(err.is_config());
        assert!(!RelayError::GenerationEmpty.is_config());
    }

    #[test]
    fn test_sanitize_google_error_envelope() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(sanitize_error_message(body), "API key not valid");
    }

    #[test]
    fn test_sanitize_plain_text_is_trimmed_and_truncated() {
        assert_eq!(sanitize_error_message("  bad gateway \n"), "bad gateway");

        let long = "x".repeat(MAX_ERROR_MESSAGE_LEN + 10);
        let sanitized = sanitize_error_message(&long);
        assert_eq!(sanitized.len(), MAX_ERROR_MESSAGE_LEN + 3);
        assert!(sanitized.ends_with("..."));
    }
}
