//! Turns, their wire form, and the append-only history store.

use crate::error::{RelayError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// One entry in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    /// A user instruction. Never carries an image.
    User {
        /// The instruction text.
        content: String,
    },
    /// A model reply. Always exactly one image.
    Model {
        /// Raw image bytes.
        image: Vec<u8>,
    },
}

impl Turn {
    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Creates a model turn.
    pub fn model(image: Vec<u8>) -> Self {
        Self::Model { image }
    }

    /// Returns the role this turn is tagged with on the wire.
    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Model { .. } => Role::Model,
        }
    }
}

/// Role of a history entry on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction written by the user.
    User,
    /// Image produced by the model.
    Model,
    /// Anything else; skipped when building content.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Wire form of a turn: `{role: "user", content}` or
/// `{role: "model", image_base64}`.
///
/// Deserialization is lenient: missing fields are tolerated here and the
/// entry is skipped later by [`HistoryEntry::to_turn`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Author of the entry.
    #[serde(default)]
    pub role: Role,
    /// Text of a user entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Base64 image of a model entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl HistoryEntry {
    /// An entry that converts to no turn.
    fn unusable() -> Self {
        Self {
            role: Role::Unknown,
            content: None,
            image_base64: None,
        }
    }

    /// Converts back into a typed turn, or `None` if the entry is missing
    /// the field its role requires or holds undecodable image data.
    pub fn to_turn(&self) -> Option<Turn> {
        match self.role {
            Role::User => self.content.clone().map(Turn::user),
            Role::Model => {
                let encoded = self.image_base64.as_deref()?;
                let image = decode_base64_lenient(encoded).ok()?;
                (!image.is_empty()).then(|| Turn::model(image))
            }
            Role::Unknown => None,
        }
    }
}

impl From<&Turn> for HistoryEntry {
    fn from(turn: &Turn) -> Self {
        match turn {
            Turn::User { content } => Self {
                role: Role::User,
                content: Some(content.clone()),
                image_base64: None,
            },
            Turn::Model { image } => Self {
                role: Role::Model,
                content: None,
                image_base64: Some(base64::engine::general_purpose::STANDARD.encode(image)),
            },
        }
    }
}

/// Parses the `history` form field: a JSON list of entries.
///
/// A blank field means no history. Individual malformed entries survive
/// parsing as entries with no turn; only a body that is not a list is
/// rejected.
pub fn parse_history(raw: &str) -> Result<Vec<HistoryEntry>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let items: Vec<serde_json::Value> = serde_json::from_str(raw).map_err(|e| {
        RelayError::InvalidRequest(format!("history must be a JSON list of turns: {}", e))
    })?;

    Ok(items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).unwrap_or_else(|e| {
                tracing::debug!(index, error = %e, "unreadable history entry");
                HistoryEntry::unusable()
            })
        })
        .collect())
}

/// Ordered, append-only sequence of turns for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a turn at the end.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// All turns in conversation order.
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if no turn was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Serializes every turn into its wire form.
    pub fn to_entries(&self) -> Vec<HistoryEntry> {
        self.turns.iter().map(HistoryEntry::from).collect()
    }

    /// Rebuilds a history from wire entries, dropping malformed ones.
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        Self {
            turns: entries.iter().filter_map(HistoryEntry::to_turn).collect(),
        }
    }
}

/// Decodes a base64 string that may be imperfectly formatted.
///
/// Accepts a data URI prefix (`data:image/png;base64,...`), missing
/// padding and embedded whitespace.
pub(crate) fn decode_base64_lenient(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let b64 = match input.find(";base64,") {
        Some(pos) => &input[pos + 8..],
        None => input,
    };

    let cleaned: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned)
}
