//! Content model of the generation API: role-tagged turns made of parts,
//! and the chunks a streamed response is made of.

use serde::{Deserialize, Serialize};

/// Author of a content entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    /// Written by the user.
    User,
    /// Produced by the model.
    Model,
}

/// One role-tagged turn sent to the generation API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Who authored the turn.
    pub role: ContentRole,
    /// Ordered parts of the turn.
    pub parts: Vec<Part>,
}

impl Content {
    /// Creates a user turn.
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: ContentRole::User,
            parts,
        }
    }

    /// Creates a model turn.
    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: ContentRole::Model,
            parts,
        }
    }
}

/// A single unit inside a turn: text, inline bytes, or a reference to an
/// uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Inline bytes.
    InlineData {
        /// The payload.
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    /// Uploaded file reference.
    FileData {
        /// The reference.
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates an inline data part from already-encoded base64.
    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::InlineData {
            inline_data: Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }

    /// Creates a part referencing an uploaded file.
    pub fn file(file: &FileRef) -> Self {
        Self::FileData {
            file_data: FileData {
                mime_type: file.mime_type.clone(),
                file_uri: file.uri.clone(),
            },
        }
    }
}

/// Inline binary payload, base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME type of the payload.
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

/// Reference to a file registered with the Files API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    /// MIME type of the file.
    pub mime_type: String,
    /// URI returned by the Files API.
    pub file_uri: String,
}

/// A file registered with the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    /// Resource name, e.g. `files/abc123`.
    #[serde(default)]
    pub name: String,
    /// URI to reference the file from content parts.
    pub uri: String,
    /// MIME type the service recorded for the file.
    pub mime_type: String,
}

/// One chunk of a streamed `generateContent` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseChunk {
    /// Candidate completions; only the first is used.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Set when the prompt was rejected.
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl ResponseChunk {
    /// First inline payload in the first candidate, if any.
    pub fn inline_image(&self) -> Option<&Blob> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
    }

    /// Concatenated text of the first candidate.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }

    /// Message describing why the prompt was blocked, if it was.
    pub fn block_message(&self) -> Option<String> {
        let feedback = self.prompt_feedback.as_ref()?;
        let reason = feedback.block_reason.as_ref()?;
        Some(
            feedback
                .block_reason_message
                .clone()
                .unwrap_or_else(|| format!("Prompt blocked: {}", reason)),
        )
    }
}

/// A candidate completion.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content.
    #[serde(default)]
    pub content: Option<CandidateContent>,
    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Parts of a candidate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    /// Ordered parts.
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

/// A part of a response chunk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePart {
    /// Text, for text parts.
    #[serde(default)]
    pub text: Option<String>,
    /// Inline bytes, for image parts.
    #[serde(default)]
    pub inline_data: Option<Blob>,
}

/// Feedback on the prompt itself.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Block reason code, e.g. `SAFETY`.
    #[serde(default)]
    pub block_reason: Option<String>,
    /// Human-readable block explanation.
    #[serde(default)]
    pub block_reason_message: Option<String>,
}
