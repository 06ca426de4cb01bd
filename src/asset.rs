//! Media payloads and archive dedup keys

use std::fmt;

/// Content type sent when the chat platform did not declare one
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Raw bytes of one attachment plus what the platform told us about it
#[derive(Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl MediaAsset {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            bytes,
        }
    }

    /// Declared content type, or `application/octet-stream`
    pub fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or(FALLBACK_CONTENT_TYPE)
    }
}

impl fmt::Debug for MediaAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaAsset")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Identifier the archive uses to recognize a re-submitted asset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    /// `"<prefix>-<attachment id>"`
    pub fn new(prefix: &str, attachment_id: u64) -> Self {
        Self(format!("{prefix}-{attachment_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_is_stable() {
        let first = DedupKey::new("discord", 1_234_567_890_123);
        let again = DedupKey::new("discord", 1_234_567_890_123);
        assert_eq!(first, again);
        assert_eq!(first.as_str(), "discord-1234567890123");
        assert_ne!(first, DedupKey::new("discord", 1_234_567_890_124));
    }

    #[test]
    fn test_content_type_fallback() {
        let asset = MediaAsset::new("a.bin", None, vec![1, 2, 3]);
        assert_eq!(asset.content_type_or_default(), FALLBACK_CONTENT_TYPE);
        assert!(format!("{asset:?}").contains("len: 3"));

        let asset = MediaAsset::new("a.jpg", Some("image/jpeg".into()), vec![]);
        assert_eq!(asset.content_type_or_default(), "image/jpeg");
    }
}
