//! Generation providers.

mod gemini;

pub(crate) use gemini::MISSING_KEY_MESSAGE;
pub use gemini::{
    GeminiModel, GeminiProvider, GeminiProviderBuilder, GenerationConfig, DEFAULT_API_BASE,
};
