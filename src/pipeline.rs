//! Ingestion pipeline
//!
//! Drives one chat session: for every supported attachment it
//! - downloads the bytes
//! - resolves the canonical capture time
//! - rewrites JPEG metadata when enabled
//! - submits the asset to the archive and reports the outcome back to the channel
//!
//! Per-attachment failures never escape this module.

use crate::archive::{ArchiveApi, UploadRequest, UploadStatus};
use crate::asset::{DedupKey, MediaAsset};
use crate::chat::{Attachment, ChatSession, IncomingMessage};
use crate::config::{Config, Settings};
use crate::error::{Error, Result};
use crate::rewrite::rewrite;
use crate::time::{CanonicalTime, MediaContext, ResolutionPolicy};
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

/// Lifecycle of one attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Received,
    DateResolved,
    MetadataRewritten,
    Submitted,
    Succeeded,
    Duplicate,
    Failed,
}

/// Final outcome of one attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stored; carries the provenance label of the winning time source
    Succeeded { provenance: &'static str },
    /// The archive already knew this dedup key
    Duplicate,
    Failed { reason: String },
}

impl Outcome {
    fn state(&self) -> IngestState {
        match self {
            Outcome::Succeeded { .. } => IngestState::Succeeded,
            Outcome::Duplicate => IngestState::Duplicate,
            Outcome::Failed { .. } => IngestState::Failed,
        }
    }
}

/// Result of processing a single attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentResult {
    pub filename: String,
    pub outcome: Outcome,
    /// Absent when the attachment failed before resolution
    pub canonical: Option<CanonicalTime>,
}

impl AttachmentResult {
    /// One-line status posted back to the channel
    pub fn status_line(&self) -> String {
        match &self.outcome {
            Outcome::Succeeded { provenance } => {
                format!("✅ Saved ({}): {}", provenance, self.filename)
            }
            Outcome::Duplicate => format!("⚠️ Already archived: {}", self.filename),
            Outcome::Failed { reason } => format!("❌ Failed: {} ({})", self.filename, reason),
        }
    }
}

/// Processing statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub processed: AtomicUsize,
    pub duplicates: AtomicUsize,
    pub failed: AtomicUsize,
    /// Attachments with an unsupported extension
    pub skipped: AtomicUsize,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Succeeded { .. } => &self.processed,
            Outcome::Duplicate => &self.duplicates,
            Outcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> String {
        format!(
            "Processed: {}, Duplicates: {}, Failed: {}, Skipped: {}",
            self.processed.load(Ordering::Relaxed),
            self.duplicates.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed)
        )
    }
}

fn transition(filename: &str, state: IngestState) {
    debug!(filename, ?state, "Ingest state");
}

/// Relays attachments from one channel into the archive
pub struct Pipeline<A: ArchiveApi> {
    archive: A,
    policy: ResolutionPolicy,
    settings: Settings,
    target_channel_id: u64,
    stats: ProcessingStats,
}

impl<A: ArchiveApi> Pipeline<A> {
    pub fn new(archive: A, config: &Config) -> Result<Self> {
        let zone = config
            .settings
            .local_zone()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            archive,
            policy: ResolutionPolicy::new(zone),
            settings: config.settings.clone(),
            target_channel_id: config.target_channel_id,
            stats: ProcessingStats::new(),
        })
    }

    pub fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    /// Poll the session until it stops or `shutdown` completes
    pub async fn run<S, F>(&self, session: &mut S, shutdown: F) -> Result<()>
    where
        S: ChatSession + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(channel_id = self.target_channel_id, "Watching channel");

        while session.is_running() {
            let batch = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                batch = session.next_batch() => batch,
            };

            match batch {
                Ok(messages) => {
                    for message in &messages {
                        self.handle_message(&*session, message).await;
                    }
                }
                Err(e) => warn!(error = %e, "Polling the channel failed"),
            }
        }

        session.stop().await?;
        Ok(())
    }

    /// Process every supported attachment of a message, one after another
    pub async fn handle_message<S>(
        &self,
        session: &S,
        message: &IncomingMessage,
    ) -> Vec<AttachmentResult>
    where
        S: ChatSession + ?Sized,
    {
        if session.self_id() == Some(message.author_id) {
            return Vec::new();
        }
        if message.channel_id != self.target_channel_id {
            return Vec::new();
        }

        debug!(
            message_id = message.id,
            attachments = message.attachments.len(),
            "Handling message"
        );
        let mut results = Vec::new();

        for attachment in &message.attachments {
            if !self.settings.is_supported(&attachment.filename) {
                debug!(filename = %attachment.filename, "Unsupported attachment skipped");
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let result = self
                .process_attachment(session, attachment, message.created_at)
                .await;

            if let Err(e) = session
                .notify(message.channel_id, &result.status_line())
                .await
            {
                warn!(filename = %result.filename, error = %e, "Failed to post status message");
            }
            results.push(result);
        }

        results
    }

    /// Download and ingest one attachment
    pub async fn process_attachment<S>(
        &self,
        session: &S,
        attachment: &Attachment,
        posted_at: DateTime<Utc>,
    ) -> AttachmentResult
    where
        S: ChatSession + ?Sized,
    {
        transition(&attachment.filename, IngestState::Received);

        let bytes = match session.download(attachment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let result = AttachmentResult {
                    filename: attachment.filename.clone(),
                    outcome: Outcome::Failed {
                        reason: e.to_string(),
                    },
                    canonical: None,
                };
                error!(filename = %attachment.filename, error = %e, "Download failed");
                return self.finish(result);
            }
        };

        let asset = MediaAsset::new(
            attachment.filename.clone(),
            attachment.content_type.clone(),
            bytes,
        );
        let key = DedupKey::new(&self.settings.dedup_prefix, attachment.id);
        self.ingest(asset, key, posted_at).await
    }

    /// Resolve, rewrite, and submit an asset whose bytes are already in memory
    pub async fn ingest(
        &self,
        mut asset: MediaAsset,
        dedup_key: DedupKey,
        posted_at: DateTime<Utc>,
    ) -> AttachmentResult {
        let filename = asset.filename.clone();

        let canonical = self.policy.resolve_media(&MediaContext {
            filename: &asset.filename,
            bytes: &asset.bytes,
            posted_at,
        });
        transition(&filename, IngestState::DateResolved);

        if self.settings.rewrite_metadata {
            let rewritten = match rewrite(&asset.bytes, &canonical, asset.content_type.as_deref()) {
                Cow::Owned(bytes) => Some(bytes),
                Cow::Borrowed(_) => None,
            };
            if let Some(bytes) = rewritten {
                asset.bytes = bytes;
                transition(&filename, IngestState::MetadataRewritten);
            }
        }

        let request = UploadRequest {
            asset,
            dedup_key,
            created_at: canonical.timestamp,
        };
        transition(&filename, IngestState::Submitted);

        let outcome = match self.archive.upload(request).await {
            Ok(UploadStatus::Created) => Outcome::Succeeded {
                provenance: canonical.source.label(),
            },
            Ok(UploadStatus::Duplicate) => Outcome::Duplicate,
            Ok(UploadStatus::Rejected { status, body }) => Outcome::Failed {
                reason: if body.is_empty() {
                    format!("status {}", status)
                } else {
                    format!("status {}: {}", status, body)
                },
            },
            Err(e) => Outcome::Failed {
                reason: e.to_string(),
            },
        };

        self.finish(AttachmentResult {
            filename,
            outcome,
            canonical: Some(canonical),
        })
    }

    fn finish(&self, result: AttachmentResult) -> AttachmentResult {
        transition(&result.filename, result.outcome.state());
        self.stats.record(&result.outcome);

        match &result.outcome {
            Outcome::Succeeded { provenance } => info!(
                filename = %result.filename,
                provenance,
                timestamp = ?result.canonical.map(|c| c.to_api_string()),
                "Archived"
            ),
            Outcome::Duplicate => info!(filename = %result.filename, "Already archived"),
            Outcome::Failed { reason } => warn!(filename = %result.filename, %reason, "Ingest failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{plain_jpeg, read_ascii};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use exif::Tag;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    const CHANNEL: u64 = 42;
    const BOT: u64 = 999;

    #[derive(Default)]
    struct FakeArchive {
        responses: HashMap<String, UploadStatus>,
        broken: Vec<String>,
        uploads: Mutex<Vec<UploadRequest>>,
    }

    #[async_trait]
    impl ArchiveApi for FakeArchive {
        async fn upload(&self, request: UploadRequest) -> Result<UploadStatus> {
            let filename = request.asset.filename.clone();
            self.uploads.lock().unwrap().push(request);
            if self.broken.contains(&filename) {
                return Err(Error::Chat("connection reset".into()));
            }
            Ok(self
                .responses
                .get(&filename)
                .cloned()
                .unwrap_or(UploadStatus::Created))
        }
    }

    #[derive(Default)]
    struct FakeSession {
        running: bool,
        batches: VecDeque<Vec<IncomingMessage>>,
        files: HashMap<u64, Vec<u8>>,
        notices: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatSession for FakeSession {
        async fn start(&mut self) -> Result<()> {
            self.running = true;
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn self_id(&self) -> Option<u64> {
            Some(BOT)
        }

        async fn next_batch(&mut self) -> Result<Vec<IncomingMessage>> {
            match self.batches.pop_front() {
                Some(batch) => Ok(batch),
                None => {
                    self.running = false;
                    Ok(Vec::new())
                }
            }
        }

        async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>> {
            self.files
                .get(&attachment.id)
                .cloned()
                .ok_or_else(|| Error::Download {
                    filename: attachment.filename.clone(),
                    message: "status 404 Not Found".into(),
                })
        }

        async fn notify(&self, _channel_id: u64, text: &str) -> Result<()> {
            self.notices.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn config() -> Config {
        Config {
            target_channel_id: CHANNEL,
            api_key: "secret".into(),
            immich_url: "http://immich.local/api/assets".into(),
            discord_token: "token".into(),
            settings: Settings::default(),
        }
    }

    fn attachment(id: u64, filename: &str, content_type: &str) -> Attachment {
        Attachment {
            id,
            filename: filename.into(),
            content_type: Some(content_type.into()),
            url: format!("https://cdn.example/{id}"),
        }
    }

    fn message(author_id: u64, attachments: Vec<Attachment>) -> IncomingMessage {
        IncomingMessage {
            id: 1000,
            channel_id: CHANNEL,
            author_id,
            created_at: Utc.with_ymd_and_hms(2025, 6, 30, 23, 15, 0).unwrap(),
            attachments,
        }
    }

    #[tokio::test]
    async fn test_pixel_photo_is_archived_with_rewritten_exif() {
        let pipeline = Pipeline::new(FakeArchive::default(), &config()).unwrap();
        let mut session = FakeSession::default();
        session.files.insert(1, plain_jpeg());

        let msg = message(7, vec![attachment(1, "PXL_20250101_050000.jpg", "image/jpeg")]);
        let results = pipeline.handle_message(&session, &msg).await;

        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].outcome,
            Outcome::Succeeded { provenance: "filename" }
        );
        assert_eq!(
            session.notices.lock().unwrap().as_slice(),
            ["✅ Saved (filename): PXL_20250101_050000.jpg"]
        );

        let uploads = pipeline.archive.uploads.lock().unwrap();
        assert_eq!(uploads[0].dedup_key.as_str(), "discord-1");
        assert_eq!(
            uploads[0].created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "2025-01-01T14:00:00"
        );
        assert_eq!(
            read_ascii(&uploads[0].asset.bytes, Tag::DateTimeOriginal).as_deref(),
            Some("2025:01:01 14:00:00")
        );
    }

    #[tokio::test]
    async fn test_rewrite_can_be_disabled() {
        let mut config = config();
        config.settings.rewrite_metadata = false;
        let pipeline = Pipeline::new(FakeArchive::default(), &config).unwrap();

        let original = plain_jpeg();
        let result = pipeline
            .ingest(
                MediaAsset::new("PXL_20250101_050000.jpg", Some("image/jpeg".into()), original.clone()),
                DedupKey::new("discord", 1),
                Utc::now(),
            )
            .await;

        assert!(matches!(result.outcome, Outcome::Succeeded { .. }));
        assert_eq!(pipeline.archive.uploads.lock().unwrap()[0].asset.bytes, original);
    }

    #[tokio::test]
    async fn test_post_time_fallback_and_duplicate() {
        let archive = FakeArchive {
            responses: HashMap::from([("clip.mp4".to_string(), UploadStatus::Duplicate)]),
            ..FakeArchive::default()
        };
        let pipeline = Pipeline::new(archive, &config()).unwrap();
        let mut session = FakeSession::default();
        session.files.insert(5, b"not really a video".to_vec());

        let msg = message(7, vec![attachment(5, "clip.mp4", "video/mp4")]);
        let results = pipeline.handle_message(&session, &msg).await;

        assert_eq!(results[0].outcome, Outcome::Duplicate);
        let canonical = results[0].canonical.unwrap();
        assert_eq!(canonical.source.label(), "post-time");
        assert_eq!(canonical.to_api_string(), "2025-07-01T08:15:00");
        assert_eq!(
            results[0].status_line(),
            "⚠️ Already archived: clip.mp4"
        );
        assert_eq!(pipeline.stats().duplicates.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_affect_siblings() {
        let archive = FakeArchive {
            responses: HashMap::from([(
                "rejected.png".to_string(),
                UploadStatus::Rejected {
                    status: 500,
                    body: String::new(),
                },
            )]),
            broken: vec!["broken.webp".to_string()],
            ..FakeArchive::default()
        };
        let pipeline = Pipeline::new(archive, &config()).unwrap();
        let mut session = FakeSession::default();
        session.files.insert(2, b"png".to_vec());
        session.files.insert(3, b"webp".to_vec());
        session.files.insert(4, b"gif".to_vec());

        let msg = message(
            7,
            vec![
                attachment(1, "missing.jpg", "image/jpeg"),
                attachment(2, "rejected.png", "image/png"),
                attachment(3, "broken.webp", "image/webp"),
                attachment(4, "fine.gif", "image/gif"),
                attachment(6, "notes.txt", "text/plain"),
            ],
        );
        let results = pipeline.handle_message(&session, &msg).await;

        let outcomes: Vec<bool> = results
            .iter()
            .map(|r| matches!(r.outcome, Outcome::Failed { .. }))
            .collect();
        assert_eq!(outcomes, vec![true, true, true, false]);
        assert!(results[0].canonical.is_none());

        let notices = session.notices.lock().unwrap();
        assert_eq!(notices.len(), 4);
        assert_eq!(notices[1], "❌ Failed: rejected.png (status 500)");
        assert!(notices[2].contains("connection reset"));
        assert_eq!(notices[3], "✅ Saved (post-time): fine.gif");

        assert_eq!(
            pipeline.stats().summary(),
            "Processed: 1, Duplicates: 0, Failed: 3, Skipped: 1"
        );
    }

    #[tokio::test]
    async fn test_own_and_foreign_messages_are_ignored() {
        let pipeline = Pipeline::new(FakeArchive::default(), &config()).unwrap();
        let mut session = FakeSession::default();
        session.files.insert(1, plain_jpeg());

        let own = message(BOT, vec![attachment(1, "photo.jpg", "image/jpeg")]);
        assert!(pipeline.handle_message(&session, &own).await.is_empty());

        let mut elsewhere = message(7, vec![attachment(1, "photo.jpg", "image/jpeg")]);
        elsewhere.channel_id = CHANNEL + 1;
        assert!(pipeline.handle_message(&session, &elsewhere).await.is_empty());

        assert!(pipeline.archive.uploads.lock().unwrap().is_empty());
        assert!(session.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_batches_and_stops() {
        let pipeline = Pipeline::new(FakeArchive::default(), &config()).unwrap();
        let mut session = FakeSession::default();
        session.files.insert(1, plain_jpeg());
        session.files.insert(2, plain_jpeg());
        session.batches.push_back(vec![message(7, vec![attachment(1, "a.jpg", "image/jpeg")])]);
        session.batches.push_back(vec![message(7, vec![attachment(2, "b.jpg", "image/jpeg")])]);
        session.start().await.unwrap();

        pipeline
            .run(&mut session, std::future::pending())
            .await
            .unwrap();

        assert!(!session.is_running());
        assert_eq!(pipeline.archive.uploads.lock().unwrap().len(), 2);
        assert_eq!(pipeline.stats().processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_run_honors_shutdown() {
        let pipeline = Pipeline::new(FakeArchive::default(), &config()).unwrap();
        let mut session = FakeSession::default();
        session.files.insert(1, plain_jpeg());
        session.batches.push_back(vec![message(7, vec![attachment(1, "a.jpg", "image/jpeg")])]);
        session.start().await.unwrap();

        pipeline.run(&mut session, async {}).await.unwrap();
        assert!(!session.is_running());
        assert!(pipeline.archive.uploads.lock().unwrap().is_empty());
    }
}
