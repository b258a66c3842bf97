//! Wire types for the Graph API responses consumed by the pipeline.
//!
//! Only the fields the pipeline actually reads are modeled; everything is
//! `#[serde(default)]` because the Graph API omits fields freely.

use serde::Deserialize;

/// One page of `/me/feed` results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub data: Vec<FeedEntry>,
}

/// A single feed entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedEntry {
    #[serde(default)]
    pub id: String,
    /// The attached object's ID; decimal string, monotonic per source.
    #[serde(default)]
    pub object_id: String,
    /// Caption text entered by the user, if any.
    #[serde(default)]
    pub message: String,
    /// The application that created the entry.
    #[serde(default)]
    pub application: Application,
    /// Present when the entry carries more than one image.
    #[serde(default)]
    pub attachments: Option<Attachments>,
}

/// The originating application of a feed entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Application {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachments {
    #[serde(default)]
    pub data: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub subattachments: SubAttachments,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubAttachments {
    #[serde(default)]
    pub data: Vec<SubAttachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubAttachment {
    #[serde(default)]
    pub target: Vec<Target>,
}

/// The concrete object a sub-attachment points at.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub id: String,
}

/// An image object with its available size variants.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageObject {
    #[serde(default)]
    pub id: String,
    /// Display name; used as the caption fallback.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageVariant>,
}

/// One resolution option for a single logical image.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageVariant {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub source: String,
}

/// Response of the long-lived token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangedToken {
    pub access_token: String,
    /// Remaining validity in seconds.
    #[serde(default)]
    pub expires_in: i64,
}

/// Response of the interactive login-code redemption.
#[derive(Debug, Clone, Deserialize)]
pub struct RedeemedCode {
    pub access_token: String,
}

/// A change notification pushed to the webhook endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeNotification {
    /// Top-level object type (e.g. "user"); empty means malformed.
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<NotificationEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub time: Option<serde_json::Value>,
    #[serde(default)]
    pub changes: Option<serde_json::Value>,
}
