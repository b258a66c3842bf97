//! Resolution of the newest tracked feed entry into downloadable images.
//!
//! One resolution fetches a single feed page, picks the first entry created
//! by the tracked application (feed order is newest-first), and expands it
//! into concrete image URLs: the widest variant of each image target, plus
//! the caption text.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::types::{ImageId, PostId};

use super::client::{GraphApi, GraphApiError};
use super::{Session, types::FeedEntry};

/// Application namespace of Nintendo Switch share posts.
pub const TRACKED_APP_NAMESPACE: &str = "nintendoswitchshare";

/// Errors that abort a resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The feed page contained no entries at all.
    #[error("feed returned no entries")]
    NoEntries,

    /// No entry originated from the tracked application.
    #[error("no entry from the tracked application")]
    NoMatchingEntry,

    /// An image target reported zero variants; partial results are not
    /// returned, the whole resolution fails.
    #[error("object {0} has no image variants")]
    NoImageVariants(String),

    /// A remote call failed.
    #[error(transparent)]
    Api(#[from] GraphApiError),
}

/// One concrete downloadable image: the widest variant of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub id: ImageId,
    /// Reported display name; may be empty.
    pub name: String,
    pub source_url: String,
    pub width: u32,
    pub height: u32,
}

/// The fully resolved newest post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPost {
    pub post_id: PostId,
    pub caption: String,
    pub images: Vec<ResolvedImage>,
}

/// Resolves the newest tracked post of a session's feed.
pub struct FeedResolver<A> {
    api: Arc<A>,
}

impl<A: GraphApi> FeedResolver<A> {
    pub fn new(api: Arc<A>) -> Self {
        FeedResolver { api }
    }

    /// Fetches one feed page and resolves its newest tracked entry.
    pub async fn resolve(&self, session: &Session) -> Result<ResolvedPost, ResolveError> {
        let page = self.api.fetch_feed(session).await?;
        if page.data.is_empty() {
            return Err(ResolveError::NoEntries);
        }

        let entry = page
            .data
            .iter()
            .find(|e| e.application.namespace == TRACKED_APP_NAMESPACE)
            .ok_or(ResolveError::NoMatchingEntry)?;

        // An unparseable object ID cannot be deduplicated, so the entry is
        // treated as if it never matched.
        let post_id = PostId::parse(&entry.object_id).ok_or(ResolveError::NoMatchingEntry)?;

        let targets = image_targets(entry);
        debug!(post = %post_id, targets = targets.len(), "resolving image targets");

        let mut caption = entry.message.clone();
        let mut images = Vec::with_capacity(targets.len());
        for target_id in &targets {
            let mut object = self.api.fetch_image(session, target_id).await?;
            if object.images.is_empty() {
                return Err(ResolveError::NoImageVariants(target_id.clone()));
            }
            // Stable sort: on equal widths the first-reported variant wins.
            object.images.sort_by(|a, b| b.width.cmp(&a.width));
            let variant = &object.images[0];

            if caption.is_empty() && !object.name.is_empty() {
                caption = object.name.clone();
            }

            images.push(ResolvedImage {
                id: ImageId::new(&object.id),
                name: object.name.clone(),
                source_url: variant.source.clone(),
                width: variant.width,
                height: variant.height,
            });
        }

        Ok(ResolvedPost {
            post_id,
            caption,
            images,
        })
    }
}

/// The object IDs whose image variants make up the post.
///
/// Multi-image posts carry their targets as sub-attachments; single-image
/// posts use the entry's own object ID.
fn image_targets(entry: &FeedEntry) -> Vec<String> {
    match &entry.attachments {
        None => vec![entry.object_id.clone()],
        Some(attachments) => attachments
            .data
            .iter()
            .flat_map(|a| a.subattachments.data.iter())
            .flat_map(|d| d.target.iter())
            .map(|t| t.id.clone())
            .collect(),
    }
}
