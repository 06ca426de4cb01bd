//! CLI argument parsing with clap

use crate::config::{Config, ConfigError, Settings};
use clap::Parser;
use std::path::PathBuf;

/// Photo Relay - forwards chat photos to a self-hosted archive
///
/// Watches one chat channel, recovers the real capture time of every
/// posted photo or video from its filename, EXIF data, or post time, and
/// uploads it to the archive with that timestamp.
#[derive(Parser, Debug)]
#[command(name = "photo-relay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Channel to watch
    #[arg(long, env = "TARGET_CHANNEL_ID")]
    pub target_channel_id: u64,

    /// Archive API key
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Archive asset upload URL
    #[arg(long, env = "IMMICH_URL")]
    pub immich_url: String,

    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: String,

    /// Path to settings file (TOML format)
    ///
    /// CLI arguments override settings file values.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Local zone as hours east of UTC (default 9)
    #[arg(long, allow_hyphen_values = true)]
    pub utc_offset: Option<i32>,

    /// Seconds between channel polls
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Upload JPEG files without rewriting their EXIF capture time
    #[arg(long)]
    pub no_rewrite: bool,

    /// Directory for daily rotated log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output log format as JSON
    #[arg(long)]
    pub json_log: bool,
}

impl Cli {
    /// Merge CLI arguments with settings from file
    /// CLI arguments take precedence over settings file values
    pub fn merge_with_settings(&self, mut settings: Settings) -> Settings {
        if let Some(offset) = self.utc_offset {
            settings.local_offset_hours = offset;
        }
        if let Some(interval) = self.poll_interval {
            settings.poll_interval_secs = interval;
        }
        if self.no_rewrite {
            settings.rewrite_metadata = false;
        }

        settings
    }

    /// Build and validate the runtime configuration
    pub fn to_config(&self, settings: Settings) -> Result<Config, ConfigError> {
        let config = Config {
            target_channel_id: self.target_channel_id,
            api_key: self.api_key.clone(),
            immich_url: self.immich_url.clone(),
            discord_token: self.discord_token.clone(),
            settings: self.merge_with_settings(settings),
        };
        config.validate()?;
        Ok(config)
    }
}
