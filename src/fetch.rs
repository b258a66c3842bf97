//! Downloading resolved images to local storage.
//!
//! Filenames are derived from the image ID plus the URL path's extension
//! (`.jpg` when absent), so a re-delivered post maps to the same files. An
//! already-present file is the file-level dedup sentinel: it fails the whole
//! batch with [`FetchError::AlreadyExists`] before any network call is made.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::graph::ResolvedImage;
use crate::types::ImageId;

/// Fallback extension when the URL path carries none.
const DEFAULT_EXTENSION: &str = ".jpg";

/// Errors that abort a fetch batch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The target file already exists. Nothing new to do; note that this
    /// aborts the whole multi-image batch, not just the one file.
    #[error("image {0} already downloaded")]
    AlreadyExists(ImageId),

    /// The source URL could not be parsed.
    #[error("invalid image URL {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// The remote answered with a non-success status.
    #[error("download of {url} failed with HTTP {status}")]
    Status { url: String, status: u16 },

    /// Transport-level failure.
    #[error("image download failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Local filesystem failure.
    #[error("image write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport seam for image downloads, stubbed out in tests.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Streams the body at `url` into the file at `dest`.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Real HTTP transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaTransport for HttpTransport {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

/// Downloads resolved images into the image directory.
pub struct ImageFetcher<T> {
    transport: Arc<T>,
    image_dir: PathBuf,
}

impl<T: MediaTransport> ImageFetcher<T> {
    pub fn new(transport: Arc<T>, image_dir: impl Into<PathBuf>) -> Self {
        ImageFetcher {
            transport,
            image_dir: image_dir.into(),
        }
    }

    /// Fetches every image of a resolved post, returning the local paths in
    /// the resolved order.
    ///
    /// Any error aborts the batch with no cleanup: files already written
    /// remain on disk, and a file that exists before its download starts
    /// fails the batch with [`FetchError::AlreadyExists`].
    pub async fn fetch(&self, images: &[ResolvedImage]) -> Result<Vec<PathBuf>, FetchError> {
        let mut paths = Vec::with_capacity(images.len());
        for image in images {
            let path = self.image_dir.join(local_filename(&image.id, &image.source_url)?);
            if tokio::fs::try_exists(&path).await? {
                debug!(file = %path.display(), "image already on disk");
                return Err(FetchError::AlreadyExists(image.id.clone()));
            }
            self.transport.download(&image.source_url, &path).await?;
            info!(file = %path.display(), "image downloaded");
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Derives the local filename for an image: `{id}{extension}`.
///
/// The extension comes from the URL path; URLs without one default to
/// `.jpg`, which is what the CDN serves in practice.
pub fn local_filename(id: &ImageId, source_url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(source_url).map_err(|source| FetchError::InvalidUrl {
        url: source_url.to_string(),
        source,
    })?;
    let extension = Path::new(parsed.path())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    Ok(format!("{id}{extension}"))
}
