//! Per-process chat session: the loaded base image, the history, and the
//! phase of the interaction cycle.

use crate::conversation::history::{History, Turn};
use crate::error::{RelayError, Result};
use crate::image::{GeneratedImage, SourceImage};
use crate::relay::GenerationRequest;

/// Phase of the chat interaction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No base image loaded; prompts are refused.
    #[default]
    AwaitingImage,
    /// An image is loaded and a prompt may be submitted.
    Ready,
    /// A request is in flight.
    Generating,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingImage => write!(f, "awaiting image"),
            Self::Ready => write!(f, "ready"),
            Self::Generating => write!(f, "generating"),
        }
    }
}

/// A prompt that has been submitted but not yet answered.
#[derive(Debug)]
#[must_use = "a pending prompt must be passed to Session::finish"]
pub struct PendingPrompt {
    prompt: String,
}

impl PendingPrompt {
    /// The submitted instruction.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// State owned by one chat session.
///
/// Created when the chat starts and dropped when it ends; nothing
/// survives the process.
#[derive(Debug, Default)]
pub struct Session {
    base_image: Option<SourceImage>,
    history: History,
    phase: Phase,
}

impl Session {
    /// Creates a session with no image and no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The conversation so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The loaded base image, if any.
    pub fn base_image(&self) -> Option<&SourceImage> {
        self.base_image.as_ref()
    }

    /// Loads (or replaces) the base image and moves to `Ready`.
    ///
    /// Refused while a request is in flight.
    pub fn load_image(&mut self, image: SourceImage) -> Result<()> {
        if self.phase == Phase::Generating {
            return Err(RelayError::InvalidRequest(
                "cannot change the image while a generation is running".into(),
            ));
        }
        image.validate()?;
        self.base_image = Some(image);
        self.phase = Phase::Ready;
        Ok(())
    }

    /// Moves `Ready -> Generating` for a non-empty prompt.
    ///
    /// Returns the pending prompt together with the request to send, which
    /// carries the history as it was before this prompt.
    pub fn begin(&mut self, prompt: &str) -> Result<(PendingPrompt, GenerationRequest)> {
        let prompt = prompt.trim();
        match self.phase {
            Phase::AwaitingImage => {
                return Err(RelayError::InvalidRequest(
                    "upload an image before sending a prompt".into(),
                ))
            }
            Phase::Generating => {
                return Err(RelayError::InvalidRequest(
                    "a generation is already running".into(),
                ))
            }
            Phase::Ready => {}
        }
        if prompt.is_empty() {
            return Err(RelayError::InvalidRequest("prompt must not be empty".into()));
        }
        let image = self
            .base_image
            .clone()
            .ok_or_else(|| RelayError::InvalidRequest("no image loaded".into()))?;

        let request = GenerationRequest::new(image, prompt).with_history(self.history.to_entries());
        self.phase = Phase::Generating;
        Ok((
            PendingPrompt {
                prompt: prompt.to_string(),
            },
            request,
        ))
    }

    /// Moves `Generating -> Ready`, appending the user and model turns only
    /// when generation succeeded. The outcome is handed back to the caller.
    pub fn finish(
        &mut self,
        pending: PendingPrompt,
        outcome: Result<GeneratedImage>,
    ) -> Result<GeneratedImage> {
        self.phase = Phase::Ready;
        let image = outcome?;
        self.history.append(Turn::user(pending.prompt));
        self.history.append(Turn::model(image.data.clone()));
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{GenerationMetadata, ImageFormat};
    use crate::test_support::{JPEG_BYTES, PNG_BYTES};

    fn cat() -> SourceImage {
        SourceImage::new("cat.png", ImageFormat::Png, PNG_BYTES.to_vec())
    }

    fn edited() -> GeneratedImage {
        GeneratedImage::from_bytes(JPEG_BYTES.to_vec(), GenerationMetadata::default())
    }

    #[test]
    fn test_starts_awaiting_image() {
        let mut session = Session::new();
        assert_eq!(session.phase(), Phase::AwaitingImage);
        assert!(matches!(
            session.begin("make it wear a hat"),
            Err(RelayError::InvalidRequest(_))
        ));
        assert_eq!(session.phase(), Phase::AwaitingImage);
    }

    #[test]
    fn test_successful_cycle_appends_user_then_model() {
        let mut session = Session::new();
        session.load_image(cat()).unwrap();
        assert_eq!(session.phase(), Phase::Ready);

        let (pending, request) = session.begin("make it wear a hat").unwrap();
        assert_eq!(session.phase(), Phase::Generating);
        assert_eq!(request.prompt, "make it wear a hat");
        assert!(request.history.is_empty());

        let image = session.finish(pending, Ok(edited())).unwrap();
        assert_eq!(session.phase(), Phase::Ready);
        assert_eq!(
            session.history().all(),
            &[Turn::user("make it wear a hat"), Turn::model(image.data)]
        );
    }

    #[test]
    fn test_second_prompt_carries_prior_turns() {
        let mut session = Session::new();
        session.load_image(cat()).unwrap();
        let (pending, _) = session.begin("make it wear a hat").unwrap();
        session.finish(pending, Ok(edited())).unwrap();

        let (_pending, request) = session.begin("now add sunglasses").unwrap();
        assert_eq!(request.history.len(), 2);
        assert_eq!(request.history[0].content.as_deref(), Some("make it wear a hat"));
        assert!(request.history[1].image_base64.is_some());
    }

    #[test]
    fn test_failure_leaves_history_untouched() {
        let mut session = Session::new();
        session.load_image(cat()).unwrap();

        let (pending, _) = session.begin("make it wear a hat").unwrap();
        let result = session.finish(pending, Err(RelayError::GenerationEmpty));
        assert!(matches!(result, Err(RelayError::GenerationEmpty)));
        assert_eq!(session.phase(), Phase::Ready);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_rejects_empty_prompt_and_overlapping_requests() {
        let mut session = Session::new();
        session.load_image(cat()).unwrap();
        assert!(session.begin("   ").is_err());
        assert_eq!(session.phase(), Phase::Ready);

        let (_pending, _) = session.begin("make it wear a hat").unwrap();
        assert!(session.begin("again").is_err());
        assert!(session.load_image(cat()).is_err());
        assert_eq!(session.phase(), Phase::Generating);
    }

    #[test]
    fn test_rejects_unsupported_image() {
        let mut session = Session::new();
        let webp = SourceImage::new("a.webp", ImageFormat::WebP, b"RIFF0000WEBP".to_vec());
        assert!(session.load_image(webp).is_err());
        assert_eq!(session.phase(), Phase::AwaitingImage);
    }
}
