//! Conversation state: turns, history, and the chat session.

mod history;
mod session;

pub use history::{parse_history, History, HistoryEntry, Role, Turn};
pub use session::{PendingPrompt, Phase, Session};
