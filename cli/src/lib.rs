use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slide_common::SlideConfig;
use slide_core::audio::CommandPlayer;
use slide_core::narration::NarrationSettings;
use slide_core::{ErrorReporter, EventSink, NarrationController, Presenter, SlideError};
use tracing_subscriber::EnvFilter;

const SPEAK_TIMEOUT_SECS: u64 = 120;

#[derive(Parser)]
#[command(name = "slide")]
#[command(about = "Presentation copilot: build and narrate a slide deck with an AI agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Override model (e.g., gpt-4o, gpt-4o-mini)
    #[arg(long)]
    pub model: Option<String>,

    /// Read configuration from this file instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Present interactively (default)
    Present,
    /// Print the action catalog offered to agents as JSON
    Catalog,
    /// Speak a text through the narration endpoint and player
    Speak {
        /// Text to narrate
        text: String,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = SlideConfig::load_from(path).await?;
            config.apply_env();
            config
        }
        None => SlideConfig::load().await?,
    };
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }

    init_logging(&config.log_path, cli.debug);
    tracing::debug!(model = %config.model, tts = %config.tts_endpoint, "configuration loaded");

    match cli.command.unwrap_or(Commands::Present) {
        Commands::Present => slide_tui::run_presenter(&config).await?,
        Commands::Catalog => print_catalog(&config)?,
        Commands::Speak { text } => speak(&config, &text).await?,
    }

    Ok(())
}

/// Log to `path` so the terminal UI stays clean. `RUST_LOG` wins unless
/// `--debug` is given.
fn init_logging(path: &Path, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let file = match open_log_file(path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            return;
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))
}

fn print_catalog(config: &SlideConfig) -> Result<()> {
    let presenter = Presenter::from_config(config, EventSink::default())?;
    println!("{}", serde_json::to_string_pretty(&presenter.catalog())?);
    Ok(())
}

async fn speak(config: &SlideConfig, text: &str) -> Result<()> {
    let mut settings = NarrationSettings::from_config(config)?;
    // A one-shot command should not wait forever on a silent player.
    settings.timeout.get_or_insert(Duration::from_secs(SPEAK_TIMEOUT_SECS));
    let factory = CommandPlayer::factory(config.player_command.clone())?;
    let narration = NarrationController::new(settings, factory);
    narration.reset().await;
    println!("🔊 {text}");
    if let Err(err) = narration.start(text).await {
        let err = SlideError::from(err);
        eprintln!("{}", ErrorReporter::format_user_error(&err));
        return Err(err.into());
    }
    Ok(())
}
