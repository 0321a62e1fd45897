//! Terminal chat front end.
//!
//! Reads commands and prompts line by line, drives a [`Session`] through
//! its phases, and re-renders the whole conversation after every phase
//! change. Generated images are written to an output directory and shown
//! as their paths.

use crate::conversation::{Phase, Session, Turn};
use crate::error::Result;
use crate::image::{ImageFormat, SourceImage};
use crate::relay::ImageEditor;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const HELP: &str = "\
commands:
  /open <path>   load a PNG or JPEG as the base image
  /history       show the conversation again
  /help          show this help
  /quit          leave
anything else is sent as an edit instruction";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load a base image.
    Open(PathBuf),
    /// Re-render the conversation.
    History,
    /// Print the command list.
    Help,
    /// Leave the loop.
    Quit,
    /// An edit instruction.
    Prompt(String),
    /// A blank line.
    Empty,
    /// A `/command` that is not recognised.
    Unknown(String),
}

/// Parses one input line.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Prompt(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name {
        "open" | "image" if !arg.is_empty() => Command::Open(PathBuf::from(arg)),
        "history" => Command::History,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Path a model turn at `index` is saved under.
pub fn image_path(output_dir: &Path, index: usize, image: &[u8]) -> PathBuf {
    let ext = ImageFormat::from_magic_bytes(image)
        .unwrap_or_default()
        .extension();
    output_dir.join(format!("turn-{:02}.{}", index + 1, ext))
}

/// Drives one chat session against an [`ImageEditor`].
pub struct ChatLoop<'a, E: ImageEditor + ?Sized, W: Write> {
    editor: &'a E,
    output_dir: PathBuf,
    out: W,
    notice: Option<String>,
}

impl<'a, E: ImageEditor + ?Sized, W: Write> ChatLoop<'a, E, W> {
    /// Creates a loop writing images under `output_dir` and text to `out`.
    pub fn new(editor: &'a E, output_dir: impl Into<PathBuf>, out: W) -> Self {
        Self {
            editor,
            output_dir: output_dir.into(),
            out,
            notice: None,
        }
    }

    /// Processes lines from `input` until `/quit` or end of input.
    pub async fn run<R>(&mut self, session: &mut Session, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.render(session)?;

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            match parse_command(&line) {
                Command::Quit => break,
                Command::Empty => continue,
                Command::Help => writeln!(self.out, "{}", HELP)?,
                Command::History => self.render(session)?,
                Command::Open(path) => self.open(session, &path).await?,
                Command::Prompt(prompt) => self.submit(session, &prompt).await?,
                Command::Unknown(cmd) => {
                    writeln!(self.out, "unknown command {}; try /help", cmd)?
                }
            }
        }
        Ok(())
    }

    /// Loads a base image from disk.
    pub async fn open(&mut self, session: &mut Session, path: &Path) -> Result<()> {
        let loaded = match tokio::fs::read(path).await {
            Ok(data) => SourceImage::from_file(path, data),
            Err(e) => Err(e.into()),
        };
        match loaded.and_then(|image| session.load_image(image)) {
            Ok(()) => self.render(session),
            Err(e) => {
                writeln!(self.out, "error: {}", e)?;
                Ok(())
            }
        }
    }

    /// Runs one prompt through the editor.
    ///
    /// Editor failures are shown inline; only output errors are returned.
    pub async fn submit(&mut self, session: &mut Session, prompt: &str) -> Result<()> {
        let (pending, request) = match session.begin(prompt) {
            Ok(started) => started,
            Err(e) => {
                writeln!(self.out, "error: {}", e)?;
                return Ok(());
            }
        };
        self.render(session)?;

        let outcome = self.editor.edit(&request).await;
        match session.finish(pending, outcome) {
            Ok(image) => {
                let index = session.history().len() - 1;
                let path = image_path(&self.output_dir, index, &image.data);
                if let Err(e) = self.save(&path, &image.data).await {
                    self.notice = Some(format!("error: could not save {}: {}", path.display(), e));
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "edit failed");
                self.notice = Some(format!("error: {}", e));
            }
        }
        self.render(session)
    }

    async fn save(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(path, data).await
    }

    /// Writes the full conversation and the current status.
    fn render(&mut self, session: &Session) -> Result<()> {
        writeln!(self.out, "---")?;
        if let Some(image) = session.base_image() {
            writeln!(self.out, "[base image: {}]", image.file_name)?;
        }
        for (index, turn) in session.history().all().iter().enumerate() {
            match turn {
                Turn::User { content } => writeln!(self.out, "you: {}", content)?,
                Turn::Model { image } => writeln!(
                    self.out,
                    "model: {} ({} bytes)",
                    image_path(&self.output_dir, index, image).display(),
                    image.len()
                )?,
            }
        }
        if let Some(notice) = self.notice.take() {
            writeln!(self.out, "{}", notice)?;
        }
        let status = match session.phase() {
            Phase::AwaitingImage => "(load an image with /open <path> to start)",
            Phase::Ready => "(what would you like to do with the image?)",
            Phase::Generating => "(generating image...)",
        };
        writeln!(self.out, "{}", status)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::image::{GeneratedImage, GenerationMetadata};
    use crate::relay::GenerationRequest;
    use crate::test_support::{JPEG_BYTES, PNG_BYTES};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Editor double that replays queued outcomes and records requests.
    struct ScriptedEditor {
        outcomes: Mutex<Vec<Result<Vec<u8>>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedEditor {
        fn new(mut outcomes: Vec<Result<Vec<u8>>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageEditor for ScriptedEditor {
        async fn edit(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
            self.requests.lock().unwrap().push(request.clone());
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(RelayError::GenerationEmpty));
            outcome.map(|data| GeneratedImage::from_bytes(data, GenerationMetadata::default()))
        }
    }

    fn write_cat(dir: &Path) -> PathBuf {
        let path = dir.join("cat.png");
        std::fs::write(&path, PNG_BYTES).unwrap();
        path
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("  "), Command::Empty);
        assert_eq!(
            parse_command("make it wear a hat"),
            Command::Prompt("make it wear a hat".into())
        );
        assert_eq!(
            parse_command("/open ./my cat.png"),
            Command::Open(PathBuf::from("./my cat.png"))
        );
        assert_eq!(parse_command("/history"), Command::History);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/open"), Command::Unknown("/open".into()));
        assert_eq!(parse_command("/dance"), Command::Unknown("/dance".into()));
    }

    #[test]
    fn test_image_path() {
        let dir = Path::new("out");
        assert_eq!(image_path(dir, 1, JPEG_BYTES), PathBuf::from("out/turn-02.jpg"));
        assert_eq!(image_path(dir, 3, PNG_BYTES), PathBuf::from("out/turn-04.png"));
    }

    #[tokio::test]
    async fn test_two_turn_conversation() {
        let scratch = tempfile::tempdir().unwrap();
        let cat = write_cat(scratch.path());
        let output_dir = scratch.path().join("out");
        let editor = ScriptedEditor::new(vec![Ok(JPEG_BYTES.to_vec()), Ok(PNG_BYTES.to_vec())]);

        let script = format!(
            "/open {}\nmake it wear a hat\nnow add sunglasses\n/quit\nignored\n",
            cat.display()
        );
        let mut session = Session::new();
        let mut out = Vec::new();
        ChatLoop::new(&editor, &output_dir, &mut out)
            .run(&mut session, script.as_bytes())
            .await
            .unwrap();

        let history = session.history().all();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], Turn::user("make it wear a hat"));
        assert_eq!(history[1], Turn::model(JPEG_BYTES.to_vec()));
        assert_eq!(history[2], Turn::user("now add sunglasses"));
        assert_eq!(history[3], Turn::model(PNG_BYTES.to_vec()));

        let requests = editor.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].history.is_empty());
        assert_eq!(requests[1].history.len(), 2);
        assert_eq!(requests[1].image.file_name, "cat.png");

        assert_eq!(
            std::fs::read(output_dir.join("turn-02.jpg")).unwrap(),
            JPEG_BYTES
        );
        assert_eq!(std::fs::read(output_dir.join("turn-04.png")).unwrap(), PNG_BYTES);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("you: make it wear a hat"));
        assert!(text.contains("(generating image...)"));
        assert!(text.contains("turn-02.jpg"));
    }

    #[tokio::test]
    async fn test_prompt_without_image_is_refused() {
        let scratch = tempfile::tempdir().unwrap();
        let editor = ScriptedEditor::new(Vec::new());

        let mut session = Session::new();
        let mut out = Vec::new();
        ChatLoop::new(&editor, scratch.path(), &mut out)
            .run(&mut session, &b"make it wear a hat\n"[..])
            .await
            .unwrap();

        assert!(session.history().is_empty());
        assert_eq!(session.phase(), Phase::AwaitingImage);
        assert!(editor.requests.lock().unwrap().is_empty());
        assert!(String::from_utf8(out).unwrap().contains("error: invalid request"));
    }

    #[tokio::test]
    async fn test_failure_is_shown_and_history_unchanged() {
        let scratch = tempfile::tempdir().unwrap();
        let cat = write_cat(scratch.path());
        let editor = ScriptedEditor::new(vec![Err(RelayError::Api {
            status: 500,
            message: "Image generation failed: no image".into(),
        })]);

        let mut session = Session::new();
        let mut out = Vec::new();
        let mut chat = ChatLoop::new(&editor, scratch.path(), &mut out);
        chat.open(&mut session, &cat).await.unwrap();
        chat.submit(&mut session, "make it wear a hat").await.unwrap();
        drop(chat);

        assert!(session.history().is_empty());
        assert_eq!(session.phase(), Phase::Ready);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("error: API error: 500 - Image generation failed: no image"));
    }

    #[tokio::test]
    async fn test_submit_creates_nested_output_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let cat = write_cat(scratch.path());
        let output_dir = scratch.path().join("a").join("b");
        let editor = ScriptedEditor::new(vec![Ok(JPEG_BYTES.to_vec())]);

        let mut session = Session::new();
        let mut out = Vec::new();
        let mut chat = ChatLoop::new(&editor, &output_dir, &mut out);
        chat.open(&mut session, &cat).await.unwrap();
        chat.submit(&mut session, "make it wear a hat").await.unwrap();
        drop(chat);

        assert_eq!(
            std::fs::read(output_dir.join("turn-02.jpg")).unwrap(),
            JPEG_BYTES
        );
        assert!(!String::from_utf8(out).unwrap().contains("could not save"));
    }

    #[tokio::test]
    async fn test_open_missing_file_is_shown_inline() {
        let scratch = tempfile::tempdir().unwrap();
        let editor = ScriptedEditor::new(Vec::new());

        let mut session = Session::new();
        let mut out = Vec::new();
        ChatLoop::new(&editor, scratch.path(), &mut out)
            .open(&mut session, &scratch.path().join("missing.png"))
            .await
            .unwrap();

        assert_eq!(session.phase(), Phase::AwaitingImage);
        assert!(String::from_utf8(out).unwrap().contains("error: I/O error"));
    }

    #[tokio::test]
    async fn test_open_rejects_unsupported_file() {
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join("cat.gif");
        std::fs::write(&path, b"GIF89a").unwrap();
        let editor = ScriptedEditor::new(Vec::new());

        let mut session = Session::new();
        let mut out = Vec::new();
        ChatLoop::new(&editor, scratch.path(), &mut out)
            .open(&mut session, &path)
            .await
            .unwrap();

        assert_eq!(session.phase(), Phase::AwaitingImage);
        assert!(String::from_utf8(out).unwrap().contains("error:"));
    }
}
