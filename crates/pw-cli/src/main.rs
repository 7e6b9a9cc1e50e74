//! CLI entry point for pathwatch.
//!
//! This binary watches one or more paths, none of which need to exist yet,
//! and logs every change of their state until interrupted.
//!
//! # Usage
//!
//! ```bash
//! pathwatch [OPTIONS] <COMMAND>
//!
//! # Follow a lock file and a config that may not exist yet
//! pathwatch watch /run/app/app.lock /etc/app/conf.d/override.json
//!
//! # Show the effective configuration
//! pathwatch --config pathwatch.json config
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use pw_core::Config;
use pw_watcher::Watcher;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watch filesystem paths through creation, deletion and directory churn.
#[derive(Parser)]
#[command(name = "pathwatch", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file.
    #[arg(short, long, global = true, env = "PATHWATCH_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch paths and log each change until Ctrl-C.
    Watch {
        /// Paths to watch. They may not exist yet.
        #[arg(required = true)]
        paths: Vec<Utf8PathBuf>,
    },

    /// Print the effective configuration as JSON.
    Config,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if verbose, or `info` level by default. The `notify`
/// backend is filtered to `warn` level.
fn init_tracing(verbose: bool, color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Colors can be disabled by config, flag or NO_COLOR
    let use_ansi = color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Builds the effective [`Config`]: the file named by `--config`, if any,
/// with command-line flags applied on top.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to load config {}: {}", path, e))?,
        None => Config::default(),
    };

    config.log.verbose |= cli.verbose;
    config.log.color &= !cli.no_color;

    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Watches every path until Ctrl-C (or SIGTERM on Unix).
///
/// # Errors
///
/// Returns an error if a watcher cannot be created.
async fn run_watch(config: &Config, paths: &[Utf8PathBuf]) -> color_eyre::Result<()> {
    let token = CancellationToken::new();
    let mut tasks = Vec::with_capacity(paths.len());

    for path in paths {
        let watcher = Watcher::with_config(path, &config.watch)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to watch {}: {}", path, e))?;
        info!(path = %watcher.target(), state = %describe(watcher.target()), "Watching");
        tasks.push(tokio::spawn(forward(watcher, token.child_token())));
    }

    wait_for_shutdown().await?;
    token.cancel();

    for result in futures_util::future::join_all(tasks).await {
        if let Err(e) = result {
            warn!(error = %e, "Watch task failed");
        }
    }

    Ok(())
}

/// Logs one watcher's changes and errors until cancelled.
async fn forward(mut watcher: Watcher, token: CancellationToken) {
    let path = watcher.target().to_owned();

    loop {
        let (updates, errors) = watcher.streams();
        tokio::select! {
            () = token.cancelled() => break,
            update = updates.recv() => match update {
                Some(()) => info!(path = %path, state = %describe(&path), "changed"),
                None => break,
            },
            Some(error) = errors.recv() => {
                warn!(path = %path, error = %error, "Watch error");
            }
        }
    }

    watcher.unsubscribe().await;
}

/// Waits for Ctrl-C, or SIGTERM on Unix.
async fn wait_for_shutdown() -> color_eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    Ok(())
}

/// Prints the effective configuration.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
fn run_config(config: &Config) -> color_eyre::Result<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize JSON: {}", e))?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// One-word-ish description of what is at `path` right now.
fn describe(path: &Utf8Path) -> String {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => "directory".to_owned(),
        Ok(meta) => format!("file ({} bytes)", meta.len()),
        Err(_) => "missing".to_owned(),
    }
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments and merge them over the config file
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    // 3. Initialize tracing
    init_tracing(config.log.verbose, config.log.color);

    // 4. Route to appropriate command
    match &cli.command {
        Commands::Watch { paths } => run_watch(&config, paths).await,
        Commands::Config => run_config(&config),
    }
}
