//! Screentap CLI: inspect displays and permissions, capture live frames.
//!
//! Usage:
//!   screentap check                 Check display server, permission, displays
//!   screentap displays [--json]     List attached displays
//!   screentap capture [OPTIONS]     Capture for a while and report delivery stats
//!   screentap snapshot [OPTIONS]    Write one raw BGRA frame to disk

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use screentap_common::config::{AppConfig, BackendKind};

mod commands;

#[derive(Parser)]
#[command(
    name = "screentap",
    about = "Live screen frames from physical displays",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/screentap/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Capture backend, overriding the config file
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    Synthetic,
    Gstreamer,
    Coregraphics,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => BackendKind::Auto,
            BackendArg::Synthetic => BackendKind::Synthetic,
            BackendArg::Gstreamer => BackendKind::Gstreamer,
            BackendArg::Coregraphics => BackendKind::Coregraphics,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check display server, screen-recording permission, and displays
    Check {
        /// Ask for screen-recording consent if it has not been decided
        #[arg(long)]
        request: bool,
    },

    /// List attached displays
    Displays {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Capture frames and report delivery statistics
    Capture {
        #[command(flatten)]
        target: TargetArgs,

        /// Stop after this many seconds (Ctrl+C stops earlier)
        #[arg(long, default_value = "5")]
        seconds: u64,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Capture one frame and write its raw BGRA bytes to a file
    Snapshot {
        #[command(flatten)]
        target: TargetArgs,

        /// Output file for the pixel data; metadata goes to <output>.json
        #[arg(short, long, default_value = "snapshot.bgra")]
        output: PathBuf,

        /// Give up if no frame arrives within this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

/// Which display to capture and how large frames may be.
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// Display id (see `screentap displays`)
    #[arg(long, conflicts_with = "index")]
    display: Option<u32>,

    /// Zero-based display index; out-of-range falls back to the primary display
    #[arg(long)]
    index: Option<usize>,

    /// Maximum frame width, 0 for native
    #[arg(long)]
    max_width: Option<u32>,

    /// Maximum frame height, 0 for native
    #[arg(long)]
    max_height: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(backend) = cli.backend {
        config.capture.backend = backend.into();
    }
    config.validate()?;

    screentap_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Check { request } => commands::check::run(&config, request),
        Commands::Displays { json } => commands::displays::run(&config, json),
        Commands::Capture {
            target,
            seconds,
            json,
        } => commands::capture::run(&config, target, seconds, json).await,
        Commands::Snapshot {
            target,
            output,
            timeout_ms,
        } => commands::snapshot::run(&config, target, output, timeout_ms),
    }
}
