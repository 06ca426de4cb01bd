//! Error types for the photo relay

use thiserror::Error;

/// Result type alias for photo relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the photo relay
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Chat session error: {0}")]
    Chat(String),

    #[error("Failed to download attachment {filename}: {message}")]
    Download { filename: String, message: String },

    #[error("Failed to parse JPEG container: {0}")]
    JpegParse(String),

    #[error("Failed to write EXIF block: {0}")]
    ExifWrite(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
