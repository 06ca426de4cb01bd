//! Configuration types for the photo relay

use chrono::FixedOffset;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Non-secret settings, optionally loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local zone used for all zone-less timestamps, in hours east of UTC
    pub local_offset_hours: i32,

    /// Value sent as `deviceId` with every upload
    pub device_id: String,

    /// Prefix of the `deviceAssetId` dedup key
    pub dedup_prefix: String,

    /// Seconds between channel polls
    pub poll_interval_secs: u64,

    /// Base URL of the Discord REST API
    pub discord_api_base: String,

    /// Rewrite JPEG capture-time tags before upload
    pub rewrite_metadata: bool,

    /// Supported image extensions
    pub image_extensions: Vec<String>,

    /// Supported video extensions
    pub video_extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local_offset_hours: 9,
            device_id: "discord-bot".into(),
            dedup_prefix: "discord".into(),
            poll_interval_secs: 5,
            discord_api_base: "https://discord.com/api/v10".into(),
            rewrite_metadata: true,
            image_extensions: vec![
                "png".into(), "jpg".into(), "jpeg".into(), "gif".into(), "webp".into(),
            ],
            video_extensions: vec![
                "mp4".into(), "mov".into(), "webm".into(), "avi".into(), "mkv".into(),
            ],
        }
    }
}

impl Settings {
    /// Check if a file extension is a supported image format
    pub fn is_image(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.image_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if a file extension is a supported video format
    pub fn is_video(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.video_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if an attachment filename has a supported extension
    pub fn is_supported(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => self.is_image(ext) || self.is_video(ext),
            None => false,
        }
    }

    /// The configured local zone
    pub fn local_zone(&self) -> Result<FixedOffset, ConfigError> {
        self.local_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidValue {
                name: "local_offset_hours",
                message: format!("{} is not a valid UTC offset", self.local_offset_hours),
            })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Load settings from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(settings)
    }
}

/// Complete runtime configuration
#[derive(Clone)]
pub struct Config {
    /// Channel whose attachments are relayed
    pub target_channel_id: u64,

    /// Archive API key, sent as `x-api-key`
    pub api_key: String,

    /// Archive asset upload endpoint
    pub immich_url: String,

    /// Discord bot token
    pub discord_token: String,

    pub settings: Settings,
}

impl Config {
    /// Check required values before anything connects
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_channel_id == 0 {
            return Err(ConfigError::MissingValue { name: "TARGET_CHANNEL_ID" });
        }
        for (name, value) in [
            ("API_KEY", &self.api_key),
            ("IMMICH_URL", &self.immich_url),
            ("DISCORD_TOKEN", &self.discord_token),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingValue { name });
            }
        }
        if !(self.immich_url.starts_with("http://") || self.immich_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                name: "IMMICH_URL",
                message: format!("'{}' is not an http(s) URL", self.immich_url),
            });
        }
        self.settings.local_zone()?;
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("target_channel_id", &self.target_channel_id)
            .field("api_key", &"<redacted>")
            .field("immich_url", &self.immich_url)
            .field("discord_token", &"<redacted>")
            .field("settings", &self.settings)
            .finish()
    }
}

/// Errors that can occur when loading or validating configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read settings file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse settings file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A required value is absent or blank
    MissingValue { name: &'static str },
    /// A value is present but unusable
    InvalidValue { name: &'static str, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::MissingValue { name } => {
                write!(f, "Required setting {} is missing", name)
            }
            ConfigError::InvalidValue { name, message } => {
                write!(f, "Invalid setting {}: {}", name, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            _ => None,
        }
    }
}
