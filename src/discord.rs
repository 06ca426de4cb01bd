//! Discord REST session
//!
//! Polls the watched channel for new messages with a bot token. Starting
//! the session records the newest existing message so that history posted
//! before startup is never re-ingested.

use crate::chat::{Attachment, ChatSession, IncomingMessage};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Discord caps message listing at 100 per request
const PAGE_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiAttachment {
    id: String,
    filename: String,
    #[serde(default)]
    content_type: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    channel_id: String,
    author: ApiUser,
    timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    attachments: Vec<ApiAttachment>,
}

impl ApiMessage {
    fn into_message(self) -> Result<IncomingMessage> {
        let attachments = self
            .attachments
            .into_iter()
            .map(|a| {
                Ok(Attachment {
                    id: parse_snowflake(&a.id)?,
                    filename: a.filename,
                    content_type: a.content_type,
                    url: a.url,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(IncomingMessage {
            id: parse_snowflake(&self.id)?,
            channel_id: parse_snowflake(&self.channel_id)?,
            author_id: parse_snowflake(&self.author.id)?,
            created_at: self.timestamp.with_timezone(&Utc),
            attachments,
        })
    }
}

fn parse_snowflake(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|_| Error::Chat(format!("Invalid snowflake id '{}'", s)))
}

/// Polling session against the Discord REST API
pub struct DiscordSession {
    client: Client,
    api_base: String,
    token: String,
    channel_id: u64,
    poll_interval: Duration,
    me: Option<u64>,
    last_seen: Option<u64>,
    running: bool,
}

impl DiscordSession {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>, channel_id: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(
                "DiscordBot (https://github.com/PianCat/photo-relay, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channel_id,
            poll_interval: Duration::from_secs(5),
            me: None,
            last_seen: None,
            running: false,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.settings.discord_api_base.clone(),
            config.discord_token.clone(),
            config.target_channel_id,
        )?
        .with_poll_interval(config.settings.poll_interval()))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let response = self.authorized(self.client.get(&url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("GET {} returned {}: {}", path, status, body)));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_messages(&self, after: Option<u64>) -> Result<Vec<IncomingMessage>> {
        let path = match after {
            Some(id) => format!(
                "/channels/{}/messages?after={}&limit={}",
                self.channel_id, id, PAGE_LIMIT
            ),
            None => format!("/channels/{}/messages?limit={}", self.channel_id, PAGE_LIMIT),
        };

        let raw: Vec<ApiMessage> = self.get_json(&path).await?;
        let mut messages = raw
            .into_iter()
            .map(ApiMessage::into_message)
            .collect::<Result<Vec<_>>>()?;
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }
}

#[async_trait]
impl ChatSession for DiscordSession {
    async fn start(&mut self) -> Result<()> {
        let me: ApiUser = self.get_json("/users/@me").await?;
        self.me = Some(parse_snowflake(&me.id)?);

        let path = format!("/channels/{}/messages?limit=1", self.channel_id);
        let newest: Vec<ApiMessage> = self.get_json(&path).await?;
        self.last_seen = newest
            .first()
            .map(|m| parse_snowflake(&m.id))
            .transpose()?;

        self.running = true;
        info!(
            user_id = ?self.me,
            channel_id = self.channel_id,
            last_seen = ?self.last_seen,
            "Discord session started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.running {
            self.running = false;
            info!(channel_id = self.channel_id, "Discord session stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn self_id(&self) -> Option<u64> {
        self.me
    }

    async fn next_batch(&mut self) -> Result<Vec<IncomingMessage>> {
        if !self.running {
            return Ok(Vec::new());
        }
        tokio::time::sleep(self.poll_interval).await;

        let messages = self.fetch_messages(self.last_seen).await?;
        if let Some(newest) = messages.last() {
            self.last_seen = Some(newest.id);
            debug!(count = messages.len(), last_seen = newest.id, "Fetched new messages");
        } else {
            trace!("No new messages");
        }
        Ok(messages)
    }

    async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        let download_error = |message: String| Error::Download {
            filename: attachment.filename.clone(),
            message,
        };

        let response = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(format!("status {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn notify(&self, channel_id: u64, text: &str) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let response = self
            .authorized(self.client.post(&url))
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("Sending message returned {}: {}", status, body)));
        }
        Ok(())
    }
}
