//! Chat platform seam
//!
//! The pipeline only sees these types, so it can be driven by the Discord
//! session in production and by an in-memory session in tests.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One file attached to a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Stable platform identifier, used for the dedup key
    pub id: u64,
    pub filename: String,
    pub content_type: Option<String>,
    /// Where the bytes can be downloaded from
    pub url: String,
}

/// A message delivered from the watched channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
}

/// Long-lived connection to the chat platform
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Connect and learn our own identity
    async fn start(&mut self) -> Result<()>;

    /// Disconnect; `next_batch` returns nothing afterwards
    async fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Our own user id, once started
    fn self_id(&self) -> Option<u64>;

    /// Wait for the next group of new messages (possibly empty)
    async fn next_batch(&mut self) -> Result<Vec<IncomingMessage>>;

    /// Read the bytes of an attachment
    async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>>;

    /// Post a short status line to a channel
    async fn notify(&self, channel_id: u64, text: &str) -> Result<()>;
}
