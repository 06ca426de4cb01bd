//! Photo Relay - forwards chat photos to a self-hosted photo archive
//!
//! This library provides functionality for relaying media posted to a chat
//! channel into an Immich-compatible archive with support for:
//! - Capture time recovery from vendor filename patterns
//! - EXIF `DateTimeOriginal` extraction
//! - Local-zone normalization with post time as the last resort
//! - JPEG EXIF rewriting so the archive shows the recovered time
//! - Dedup-keyed multipart uploads
//! - Discord REST polling with per-attachment status replies

pub mod archive;
pub mod asset;
pub mod chat;
pub mod cli;
pub mod config;
pub mod discord;
pub mod error;
pub mod pipeline;
pub mod rewrite;
pub mod time;

#[cfg(test)]
mod testing;

pub use archive::{ArchiveApi, ArchiveClient, UploadRequest, UploadStatus};
pub use asset::{DedupKey, MediaAsset};
pub use chat::{Attachment, ChatSession, IncomingMessage};
pub use cli::Cli;
pub use config::{Config, ConfigError, Settings};
pub use discord::DiscordSession;
pub use error::{Error, Result};
pub use pipeline::{AttachmentResult, Outcome, Pipeline, ProcessingStats};
pub use time::{CanonicalTime, MediaContext, ResolutionPolicy, TimeSource};
