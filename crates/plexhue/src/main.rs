use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use plexhue::config::LoggingConfig;
use plexhue::api;
use plexhue::hue::HueClient;
use plexhue::Config;
use plexhue::Orchestrator;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Switch Hue lights on Plex playback events
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "plexhue.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Run the webhook server (default)
    Serve,

    /// Create the state file
    InitState {
        /// Replace an existing state file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and print diagnostics
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, diagnostics) = match Config::from_file(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if !diagnostics.items.is_empty() {
        eprint!("{}", diagnostics);
    }

    let command = cli.command.unwrap_or(Command::Serve);
    if let Command::CheckConfig = command {
        println!("{}: configuration is valid", cli.config.display());
        return Ok(());
    }

    let log_truncated = init_logging(&config.logging)?;

    tracing::info!("plexhue {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded config from: {}", cli.config.display());
    if log_truncated {
        tracing::info!("Log file has been truncated due to reaching max size");
    }

    let timeout = config.hue.request_timeout_secs.map(Duration::from_secs);
    let bridge = HueClient::new(config.hue.api_url.clone(), timeout)?;
    let config = Arc::new(config);
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), Arc::new(bridge)));

    if let Command::InitState { force } = command {
        let status = orchestrator.init_state(force)?;
        tracing::info!(
            "Created state file {} (enabled: {})",
            config.state.path.display(),
            status.enabled
        );
        return Ok(());
    }

    tracing::info!(
        "Watching player '{}' for {} group(s)",
        config.plex.player,
        config.groups.len()
    );

    match orchestrator.status().await {
        Ok(status) => tracing::info!(
            "State: enabled={}, last event={:?}, {} captured light(s)",
            status.enabled,
            status.last_event,
            status.captured_lights
        ),
        Err(e) => tracing::warn!("{}", e),
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown_tx.send(()).ok();
    });

    api::serve(
        &config.server.listen,
        config.server.port,
        orchestrator,
        shutdown_rx,
    )
    .await
    .map_err(|e| anyhow::anyhow!("HTTP server failed: {}", e))?;

    tracing::info!("plexhue shutdown complete");

    Ok(())
}

/// Set up stderr logging, plus the log file when one is configured.
///
/// Returns whether the log file was truncated.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<bool> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(logging.level).into())
        .parse_lossy("");

    for (target, level) in &logging.overrides {
        let directive: Directive = format!("{}={}", target, level).parse()?;
        filter = filter.add_directive(directive);
    }

    let mut truncated = false;
    let file_layer = match &logging.file {
        Some(path) => {
            let (file, was_truncated) = open_log_file(path, logging.max_size_kb)?;
            truncated = was_truncated;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(truncated)
}

/// Open the log file for appending, emptying it first if it has grown past `max_size_kb`.
fn open_log_file(path: &Path, max_size_kb: u64) -> std::io::Result<(File, bool)> {
    let too_large = std::fs::metadata(path)
        .map(|m| m.len() >= max_size_kb.saturating_mul(1024))
        .unwrap_or(false);

    if too_large {
        File::create(path)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok((file, too_large))
}
