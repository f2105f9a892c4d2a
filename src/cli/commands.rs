//! CLI command definitions for sketch-gate.
//!
//! Every command shares one request controller, so chat and enhancement
//! requests issued by the same process respect the same concurrency cap and
//! start spacing.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use futures::future::join_all;
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::llm::{
    create_chat, create_enhancer, find_style, user_facing_message, EnhanceImageParams, LlmConfig,
    Part, ProviderKind, Role, ENHANCEMENT_STYLES,
};
use crate::scheduler::RequestController;

/// How often the status indicator samples the queue.
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default output directory for enhanced images.
const DEFAULT_OUTPUT_DIR: &str = "./enhanced";

/// Chat about drawings and restyle sketches with generative AI models.
#[derive(Parser)]
#[command(name = "sketch-gate")]
#[command(about = "Chat about drawings and enhance sketches through a paced request queue")]
#[command(version)]
#[command(
    long_about = "sketch-gate sends drawings to a generative AI model for conversation or restyling.\n\nAll requests pass through one admission queue: at most a few run at once, starts are spaced out, and transient failures are retried with exponential backoff.\n\nExample usage:\n  sketch-gate chat --image dragon.png --prompt \"What do you think of my drawing?\"\n  sketch-gate enhance --image dragon.png --style childhood --style digital"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Chat provider; overrides LLM_PROVIDER.
    #[arg(long, global = true, value_enum, env = "LLM_PROVIDER")]
    pub provider: Option<ProviderKind>,

    /// Print Prometheus metrics to stderr when the command finishes.
    #[arg(long, global = true)]
    pub print_metrics: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Ask the model about a drawing and stream the reply.
    Chat(ChatArgs),

    /// Restyle a sketch in one or more enhancement styles.
    Enhance(EnhanceArgs),

    /// List the available enhancement styles.
    Styles(StylesArgs),
}

/// Arguments for `sketch-gate chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Message to send.
    #[arg(short, long)]
    pub prompt: String,

    /// Image to attach; may be repeated.
    #[arg(short, long)]
    pub image: Vec<PathBuf>,

    /// System prompt replacing the default persona.
    #[arg(long)]
    pub system: Option<String>,
}

/// Arguments for `sketch-gate enhance`.
#[derive(Parser, Debug)]
pub struct EnhanceArgs {
    /// Sketch to enhance.
    #[arg(short, long)]
    pub image: PathBuf,

    /// Style id (see `sketch-gate styles`); may be repeated.
    #[arg(short, long, required = true)]
    pub style: Vec<String>,

    /// Custom instruction replacing the style's own prompt.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Directory for the enhanced images.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,
}

/// Arguments for `sketch-gate styles`.
#[derive(Parser, Debug)]
pub struct StylesArgs {
    /// Print the styles as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments without executing.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Chat(args) => run_chat_command(args, cli.provider).await,
        Commands::Enhance(args) => run_enhance_command(args).await,
        Commands::Styles(args) => run_styles_command(args),
    }
}

fn load_llm_config(provider: Option<ProviderKind>) -> anyhow::Result<LlmConfig> {
    let mut config = LlmConfig::from_env()?;
    if let Some(provider) = provider {
        config.provider = provider;
    }
    Ok(config)
}

// ============================================================================
// Chat
// ============================================================================

async fn run_chat_command(args: ChatArgs, provider: Option<ProviderKind>) -> anyhow::Result<()> {
    let config = load_llm_config(provider)?;
    let controller = RequestController::from_env()?;
    let mut session = create_chat(&config, controller)?;
    if let Some(system) = args.system {
        session = session.with_system_prompt(system);
    }

    let mut parts = Vec::with_capacity(args.image.len() + 1);
    for path in &args.image {
        let (mime_type, bytes) = load_image(path)?;
        parts.push(Part::image_bytes(mime_type, &bytes));
    }
    parts.push(Part::text(args.prompt));

    info!(
        backend = session.backend_name(),
        images = args.image.len(),
        "Sending message"
    );

    let mut stream = match session.send_message_stream(parts).await {
        Ok(stream) => stream,
        Err(err) => return Err(anyhow::anyhow!(user_facing_message(&err))),
    };

    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        stdout.write_all(chunk.text.as_bytes())?;
        stdout.flush()?;
    }
    writeln!(stdout)?;

    let turns = session.history().iter().filter(|t| t.role != Role::System).count();
    info!(turns = turns, "Conversation updated");
    Ok(())
}

// ============================================================================
// Enhance
// ============================================================================

#[derive(Debug, Serialize)]
struct EnhanceEntry {
    style: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EnhanceSummary {
    input: String,
    succeeded: usize,
    failed: usize,
    results: Vec<EnhanceEntry>,
}

async fn run_enhance_command(args: EnhanceArgs) -> anyhow::Result<()> {
    let mut styles = Vec::with_capacity(args.style.len());
    for id in &args.style {
        let style = find_style(id).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown style '{}'. Run `sketch-gate styles` to list them.",
                id
            )
        })?;
        styles.push(style);
    }

    let (mime_type, bytes) = load_image(&args.image)?;
    let image_data = STANDARD.encode(&bytes);

    let config = LlmConfig::from_env()?;
    let controller = RequestController::from_env()?;
    let enhancer = create_enhancer(&config, controller.clone())?;

    fs::create_dir_all(&args.output_dir)?;
    let stem = args
        .image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sketch")
        .to_string();

    info!(
        input = %args.image.display(),
        styles = styles.len(),
        "Submitting enhancements"
    );

    let indicator = spawn_status_indicator(controller.clone());

    let requests = styles.iter().map(|style| {
        let mut params = EnhanceImageParams::new(image_data.clone(), *style)
            .with_mime_type(mime_type.clone());
        if let Some(prompt) = &args.prompt {
            params = params.with_custom_prompt(prompt.clone());
        }
        enhancer.enhance_image(params)
    });
    let results = join_all(requests).await;
    indicator.abort();

    let mut entries = Vec::with_capacity(results.len());
    for (style, result) in styles.iter().zip(results) {
        let entry = match result.image_data {
            Some(data) if result.success => {
                let path = args.output_dir.join(format!("{}-{}.png", stem, style.id));
                write_image(&path, &data)?;
                info!(style = style.id, path = %path.display(), "Saved enhanced image");
                EnhanceEntry {
                    style: style.id.to_string(),
                    success: true,
                    output: Some(path.display().to_string()),
                    error: None,
                }
            }
            _ => {
                warn!(style = style.id, error = ?result.error, "Enhancement failed");
                EnhanceEntry {
                    style: style.id.to_string(),
                    success: false,
                    output: None,
                    error: result.error,
                }
            }
        };
        entries.push(entry);
    }

    let succeeded = entries.iter().filter(|e| e.success).count();
    let summary = EnhanceSummary {
        input: args.image.display().to_string(),
        succeeded,
        failed: entries.len() - succeeded,
        results: entries,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.succeeded == 0 {
        return Err(anyhow::anyhow!("No enhancement succeeded"));
    }
    Ok(())
}

/// Logs the controller's status once per second while there is work.
fn spawn_status_indicator(controller: RequestController) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let status = controller.status();
            if !status.is_idle() {
                info!(
                    queue_size = status.queue_size,
                    concurrent_requests = status.concurrent_requests,
                    is_processing = status.is_processing,
                    "Queue status"
                );
            }
        }
    })
}

fn write_image(path: &Path, base64_data: &str) -> anyhow::Result<()> {
    let bytes = STANDARD
        .decode(base64_data.trim())
        .map_err(|e| anyhow::anyhow!("Model returned invalid image data: {}", e))?;
    fs::write(path, bytes)?;
    Ok(())
}

// ============================================================================
// Styles
// ============================================================================

fn run_styles_command(args: StylesArgs) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(ENHANCEMENT_STYLES)?);
        return Ok(());
    }

    for style in ENHANCEMENT_STYLES {
        println!(
            "{} {:<15} {} - {}",
            style.emoji, style.id, style.name, style.description
        );
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Reads an image file and infers its MIME type from the extension.
fn load_image(path: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    let mime_type = mime_type_for(path).ok_or_else(|| {
        anyhow::anyhow!(
            "Unsupported image type: {} (expected png, jpg, webp or gif)",
            path.display()
        )
    })?;
    let bytes = fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read image {}: {}", path.display(), e))?;
    Ok((mime_type.to_string(), bytes))
}

fn mime_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for(Path::new("dragon.PNG")), Some("image/png"));
        assert_eq!(mime_type_for(Path::new("a/b/castle.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_type_for(Path::new("houses.jpg")), Some("image/jpeg"));
        assert_eq!(mime_type_for(Path::new("x.webp")), Some("image/webp"));
        assert_eq!(mime_type_for(Path::new("notes.txt")), None);
        assert_eq!(mime_type_for(Path::new("no_extension")), None);
    }

    #[test]
    fn test_load_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sketch.png");
        fs::write(&path, b"\x89PNG").expect("write");

        let (mime, bytes) = load_image(&path).expect("loads");
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"\x89PNG");

        let err = load_image(&dir.path().join("missing.png")).expect_err("missing file");
        assert!(err.to_string().contains("missing.png"));
    }

    #[test]
    fn test_write_image_decodes_base64() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.png");

        write_image(&path, "aGVsbG8=").expect("writes");
        assert_eq!(fs::read(&path).expect("read"), b"hello");

        assert!(write_image(&path, "not base64!").is_err());
    }

    #[test]
    fn test_parse_enhance_args() {
        let cli = Cli::try_parse_from([
            "sketch-gate",
            "enhance",
            "--image",
            "dragon.png",
            "--style",
            "childhood",
            "--style",
            "digital",
            "--log-level",
            "debug",
        ])
        .expect("valid args");

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Enhance(args) => {
                assert_eq!(args.style, vec!["childhood", "digital"]);
                assert_eq!(args.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
                assert!(args.prompt.is_none());
            }
            _ => panic!("expected enhance command"),
        }
    }

    #[test]
    fn test_parse_chat_provider() {
        let cli = Cli::try_parse_from([
            "sketch-gate",
            "--provider",
            "ollama",
            "chat",
            "--prompt",
            "hi",
        ])
        .expect("valid args");
        assert_eq!(cli.provider, Some(ProviderKind::Ollama));
        assert!(matches!(cli.command, Commands::Chat(_)));
    }

    #[test]
    fn test_enhance_requires_style() {
        assert!(Cli::try_parse_from(["sketch-gate", "enhance", "--image", "a.png"]).is_err());
    }
}
