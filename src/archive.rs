//! Archive upload client
//!
//! Submits one asset per multipart request. The archive answers 201 for a
//! new asset and 409 when the `deviceAssetId` is already registered.

use crate::asset::{DedupKey, MediaAsset};
use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

/// Everything the archive needs for one upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub asset: MediaAsset,
    pub dedup_key: DedupKey,
    /// Zone-less canonical creation time
    pub created_at: NaiveDateTime,
}

/// How the archive answered an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// 201: the asset was created
    Created,
    /// 409: the dedup key is already registered
    Duplicate,
    /// Any other status, with the response body for diagnostics
    Rejected { status: u16, body: String },
}

/// Upload seam used by the pipeline
#[async_trait]
pub trait ArchiveApi: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadStatus>;
}

/// HTTP client for the archive's asset endpoint
pub struct ArchiveClient {
    client: Client,
    url: String,
    api_key: String,
    device_id: String,
}

impl ArchiveClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, device_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("photo-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            device_id: device_id.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.immich_url.clone(),
            config.api_key.clone(),
            config.settings.device_id.clone(),
        )
    }
}

#[async_trait]
impl ArchiveApi for ArchiveClient {
    async fn upload(&self, request: UploadRequest) -> Result<UploadStatus> {
        let UploadRequest {
            asset,
            dedup_key,
            created_at,
        } = request;
        let timestamp = created_at.format("%Y-%m-%dT%H:%M:%S").to_string();
        let content_type = asset.content_type_or_default().to_string();

        debug!(
            filename = %asset.filename,
            dedup_key = %dedup_key,
            %timestamp,
            size = asset.bytes.len(),
            "Submitting asset"
        );

        let part = Part::bytes(asset.bytes)
            .file_name(asset.filename)
            .mime_str(&content_type)?;

        let form = Form::new()
            .text("deviceAssetId", dedup_key.to_string())
            .text("deviceId", self.device_id.clone())
            .text("fileCreatedAt", timestamp.clone())
            .text("fileModifiedAt", timestamp)
            .text("isFavorite", "false")
            .part("assetData", part);

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::CREATED => Ok(UploadStatus::Created),
            StatusCode::CONFLICT => Ok(UploadStatus::Duplicate),
            _ => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                warn!(status = status.as_u16(), %body, "Archive rejected upload");
                Ok(UploadStatus::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Matcher;

    fn request() -> UploadRequest {
        UploadRequest {
            asset: MediaAsset::new(
                "PXL_20250101_050000.jpg",
                Some("image/jpeg".into()),
                b"fake-jpeg-bytes".to_vec(),
            ),
            dedup_key: DedupKey::new("discord", 42),
            created_at: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(14, 0, 0)
                .unwrap(),
        }
    }

    fn client(server: &mockito::Server) -> ArchiveClient {
        ArchiveClient::new(format!("{}/api/assets", server.url()), "secret", "discord-bot").unwrap()
    }

    #[tokio::test]
    async fn test_created_upload_sends_contract_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/assets")
            .match_header("x-api-key", "secret")
            .match_header("accept", "application/json")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="deviceAssetId"\r\n\r\ndiscord-42\r\n"#.into()),
                Matcher::Regex(r#"name="deviceId"\r\n\r\ndiscord-bot\r\n"#.into()),
                Matcher::Regex(r#"name="fileCreatedAt"\r\n\r\n2025-01-01T14:00:00\r\n"#.into()),
                Matcher::Regex(r#"name="fileModifiedAt"\r\n\r\n2025-01-01T14:00:00\r\n"#.into()),
                Matcher::Regex(r#"name="isFavorite"\r\n\r\nfalse\r\n"#.into()),
                Matcher::Regex(r#"name="assetData"; filename="PXL_20250101_050000.jpg""#.into()),
                Matcher::Regex("fake-jpeg-bytes".into()),
            ]))
            .with_status(201)
            .with_body(r#"{"id":"abc","status":"created"}"#)
            .create_async()
            .await;

        let status = client(&server).upload(request()).await.unwrap();
        assert_eq!(status, UploadStatus::Created);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_conflict_is_duplicate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/assets")
            .with_status(409)
            .with_body(r#"{"message":"duplicate"}"#)
            .create_async()
            .await;

        let status = client(&server).upload(request()).await.unwrap();
        assert_eq!(status, UploadStatus::Duplicate);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_other_status_is_rejected_with_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/assets")
            .with_status(401)
            .with_body("Invalid API key")
            .create_async()
            .await;

        let status = client(&server).upload(request()).await.unwrap();
        assert_eq!(
            status,
            UploadStatus::Rejected {
                status: 401,
                body: "Invalid API key".into()
            }
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_error() {
        // Nothing listens on port 9 locally
        let client = ArchiveClient::new("http://127.0.0.1:9/api/assets", "secret", "bot").unwrap();
        assert!(client.upload(request()).await.is_err());
    }
}
