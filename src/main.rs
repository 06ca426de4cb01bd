//! Photo Relay - forwards chat photos to a self-hosted archive
//!
//! Watches one Discord channel and uploads every posted photo or video
//! with its recovered capture time.

use anyhow::{Context, Result};
use clap::Parser;
use photo_relay::{ArchiveClient, ChatSession, Cli, Config, DiscordSession, Pipeline, Settings};
use std::path::{Path, PathBuf};
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_PREFIX: &str = "photo-relay.log";

#[tokio::main]
async fn main() -> Result<()> {
    // Values in a local .env file fill in unset environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _guard = setup_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Photo Relay starting");

    let config = load_config(&cli)?;
    if cli.verbose {
        info!(?config, "Configuration loaded");
    }

    let archive = ArchiveClient::from_config(&config)?;
    let pipeline = Pipeline::new(archive, &config)?;

    let mut session = DiscordSession::from_config(&config)?;
    session
        .start()
        .await
        .context("Failed to start Discord session")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C, running until the session stops");
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = pipeline.run(&mut session, shutdown).await {
        error!(error = %e, "Session ended with an error");
    }

    info!(stats = %pipeline.stats().summary(), "Photo Relay stopped");
    Ok(())
}

/// Resolve config path - `-C relay` also finds `relay.toml`
fn resolve_config_path(config_path: &Path) -> PathBuf {
    if config_path.exists() || config_path.extension().is_some() {
        return config_path.to_path_buf();
    }
    config_path.with_extension("toml")
}

/// Load settings from file (if given), merge CLI flags, then validate
fn load_config(cli: &Cli) -> Result<Config> {
    let settings = match cli.config {
        Some(ref config_path) => {
            let resolved_path = resolve_config_path(config_path);
            info!(config_file = %resolved_path.display(), "Loading settings from file");
            Settings::load_from_file(&resolved_path)?
        }
        None => Settings::default(),
    };

    let config = cli
        .to_config(settings)
        .context("Invalid configuration")?;
    Ok(config)
}

/// Setup logging: stderr always, plus a daily rotated file with `--log-dir`
fn setup_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let (file_writer, guard) = match cli.log_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (Some(non_blocking), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if cli.json_log {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
            }))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_writer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer)))
            .init();
    }

    Ok(guard)
}
