//! Republishing to a Mastodon instance.
//!
//! Media are uploaded sequentially in resolved order (the order determines
//! display order on the remote post), then a single status referencing all of
//! them is submitted. Any upload failure aborts before the status is posted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{MediaId, StatusId};

/// Errors that abort a publish.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Transport-level failure.
    #[error("mastodon request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The instance answered with a non-success status.
    #[error("mastodon returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Reading a local media file failed.
    #[error("could not read media file: {0}")]
    Io(#[from] std::io::Error),
}

/// The operations the pipeline needs from the publishing service.
#[async_trait]
pub trait PublishApi: Send + Sync {
    /// Uploads one file as a media attachment.
    async fn upload_media(&self, path: &Path) -> Result<MediaId, PublishError>;

    /// Posts one status referencing previously uploaded media.
    async fn post_status(&self, text: &str, media_ids: &[MediaId])
    -> Result<StatusId, PublishError>;
}

/// Publishes a pipeline result to the secondary service.
pub struct Publisher<P> {
    api: Arc<P>,
}

impl<P: PublishApi> Publisher<P> {
    pub fn new(api: Arc<P>) -> Self {
        Publisher { api }
    }

    /// Uploads every file, then posts one status referencing them all.
    ///
    /// A failed status submission after successful uploads leaves orphaned
    /// remote media; there is no cleanup (accepted limitation).
    pub async fn publish(
        &self,
        caption: &str,
        files: &[PathBuf],
    ) -> Result<StatusId, PublishError> {
        let mut media_ids = Vec::with_capacity(files.len());
        for file in files {
            let media_id = self.api.upload_media(file).await?;
            debug!(file = %file.display(), media = %media_id, "media uploaded");
            media_ids.push(media_id);
        }

        let status_id = self.api.post_status(caption, &media_ids).await?;
        info!(status = %status_id, media = media_ids.len(), "status posted");
        Ok(status_id)
    }
}

/// Attachment record returned by the media upload endpoint.
#[derive(Debug, Deserialize)]
struct Attachment {
    id: String,
}

/// Status record returned by the status endpoint.
#[derive(Debug, Deserialize)]
struct Status {
    id: String,
}

/// Real HTTP client for a Mastodon instance.
#[derive(Debug, Clone)]
pub struct MastodonClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MastodonClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        MastodonClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PublishError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PublishApi for MastodonClient {
    async fn upload_media(&self, path: &Path) -> Result<MediaId, PublishError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(format!("{}/api/v1/media", self.base_url))
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await?;
        let attachment: Attachment = Self::decode(response).await?;
        Ok(MediaId::new(attachment.id))
    }

    async fn post_status(
        &self,
        text: &str,
        media_ids: &[MediaId],
    ) -> Result<StatusId, PublishError> {
        let body = serde_json::json!({
            "status": text,
            "media_ids": media_ids,
        });
        let response = self
            .http
            .post(format!("{}/api/v1/statuses", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let status: Status = Self::decode(response).await?;
        Ok(StatusId::new(status.id))
    }
}
