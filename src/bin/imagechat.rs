//! CLI for ImageChat - conversational image editing over Gemini.

use clap::{Args, Parser, Subcommand, ValueEnum};
use imagechat::client::DEFAULT_RELAY_URL;
use imagechat::server::{self, ServerConfig, DEFAULT_BODY_LIMIT};
use imagechat::{
    ChatLoop, GeminiModel, GeminiProvider, GenerationRequest, ImageEditor, Relay, RelayClient,
    Session, SourceImage,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imagechat")]
#[command(about = "Edit an image by chatting with Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay HTTP server
    Serve(ServeArgs),

    /// Start an interactive editing session in the terminal
    Chat(ChatArgs),

    /// Apply a single edit instruction to an image
    Edit(EditArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Gemini model to relay to
    #[arg(short, long, value_enum, default_value = "flash-exp")]
    model: ModelArg,

    /// Directory uploads are staged in (defaults to the system temp dir)
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Largest accepted request body, in megabytes
    #[arg(long, default_value_t = DEFAULT_BODY_LIMIT / (1024 * 1024))]
    max_upload_mb: usize,
}

#[derive(Args)]
struct ChatArgs {
    /// Relay server to send edits to
    #[arg(long, env = "IMAGECHAT_SERVER", default_value = DEFAULT_RELAY_URL)]
    server: String,

    /// Call Gemini directly instead of going through a relay server
    #[arg(long)]
    direct: bool,

    /// Gemini model to use with --direct
    #[arg(short, long, value_enum, default_value = "flash-exp")]
    model: ModelArg,

    /// Base image to load at startup
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Directory generated images are written to
    #[arg(short, long, default_value = "imagechat-output")]
    output: PathBuf,
}

#[derive(Args)]
struct EditArgs {
    /// The edit instruction
    prompt: String,

    /// Image to edit
    #[arg(short, long)]
    input: PathBuf,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,

    /// Gemini model to use
    #[arg(short, long, value_enum, default_value = "flash-exp")]
    model: ModelArg,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    /// gemini-2.0-flash-exp-image-generation
    FlashExp,
    /// gemini-2.5-flash-image
    NanoBanana,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::FlashExp => GeminiModel::FlashExpImageGeneration,
            ModelArg::NanoBanana => GeminiModel::NanoBanana,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Chat output shares the terminal with logs, so keep it quiet by default.
    let default_level = match cli.command {
        Commands::Chat(_) => "warn",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(args) => run_server(args).await?,
        Commands::Chat(args) => run_chat(args).await?,
        Commands::Edit(args) => run_edit(args).await?,
    }

    Ok(())
}

fn build_relay(model: ModelArg) -> imagechat::Result<Relay> {
    let provider = GeminiProvider::builder().model(model.into()).build()?;
    Ok(Relay::new(Arc::new(provider)))
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let relay = match build_relay(args.model) {
        Ok(relay) => relay,
        Err(e) if e.is_config() => {
            tracing::warn!(error = %e, "starting without a generation provider");
            Relay::unconfigured()
        }
        Err(e) => return Err(e.into()),
    };

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let config = ServerConfig {
        addr,
        body_limit: args.max_upload_mb * 1024 * 1024,
        staging_dir: args.staging_dir,
    };
    server::serve(config, relay).await?;
    Ok(())
}

async fn run_chat(args: ChatArgs) -> anyhow::Result<()> {
    let editor: Box<dyn ImageEditor> = if args.direct {
        Box::new(build_relay(args.model)?)
    } else {
        Box::new(RelayClient::new(&args.server)?)
    };

    let mut session = Session::new();
    let mut chat = ChatLoop::new(editor.as_ref(), &args.output, std::io::stdout());
    if let Some(path) = &args.image {
        chat.open(&mut session, path).await?;
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    chat.run(&mut session, stdin).await?;
    Ok(())
}

async fn run_edit(args: EditArgs) -> anyhow::Result<()> {
    let relay = build_relay(args.model)?;
    let data = tokio::fs::read(&args.input).await?;
    let image = SourceImage::from_file(&args.input, data)?;
    let request = GenerationRequest::new(image, &args.prompt);

    let edited = relay.generate(&request).await?;
    tokio::fs::write(&args.output, &edited.data).await?;

    if args.json {
        let result = serde_json::json!({
            "type": "image",
            "success": true,
            "output": args.output.display().to_string(),
            "size_bytes": edited.size(),
            "format": edited.format.extension(),
            "model": edited.metadata.model,
            "duration_ms": edited.metadata.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Edited image: {} ({} bytes)",
            args.output.display(),
            edited.size()
        );
        if let Some(duration) = edited.metadata.duration_ms {
            println!("Duration: {}ms", duration);
        }
    }

    Ok(())
}
