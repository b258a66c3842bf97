//! HTTP client for the Graph API.
//!
//! `GraphClient` implements the [`GraphApi`] trait against the real service.
//! Every remote failure maps to a [`GraphApiError`]; there is no retry or
//! backoff anywhere - a failed call aborts the current pipeline run (or, for
//! the token exchange, terminates the process).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::Session;
use super::types::{ChangeNotification, ExchangedToken, FeedPage, ImageObject, RedeemedCode};

/// Default Graph API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";

/// Fields requested for a feed page.
const FEED_FIELDS: &str = "application,object_id,message,attachments";
/// Fields requested for an image object.
const IMAGE_FIELDS: &str = "name,images";
/// Subscription topics pushed to the webhook endpoint.
const SUBSCRIPTION_FIELDS: &str = "feed,photos,videos";

/// Errors returned by Graph API calls.
#[derive(Debug, Error)]
pub enum GraphApiError {
    /// Transport-level failure (connect, timeout, decode).
    #[error("graph request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("graph API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// The operations the pipeline needs from the remote feed service.
///
/// Kept narrow so tests can substitute a stub without any HTTP involved.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Fetches one page of the user's feed.
    async fn fetch_feed(&self, session: &Session) -> Result<FeedPage, GraphApiError>;

    /// Fetches the image-variant list of an object.
    async fn fetch_image(
        &self,
        session: &Session,
        object_id: &str,
    ) -> Result<ImageObject, GraphApiError>;

    /// Exchanges the session's token for a long-lived one.
    async fn exchange_token(&self, session: &Session) -> Result<ExchangedToken, GraphApiError>;

    /// Redeems an interactive login code for a short-lived token.
    async fn redeem_code(
        &self,
        app_id: &str,
        app_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<String, GraphApiError>;

    /// Subscribes the application to change notifications for the given
    /// callback URL. Returns the raw subscription response for logging.
    async fn subscribe(
        &self,
        app_id: &str,
        app_secret: &str,
        callback_url: &str,
        verify_token: &str,
    ) -> Result<serde_json::Value, GraphApiError>;
}

/// Real HTTP implementation of [`GraphApi`].
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        GraphClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Issues a GET and decodes a JSON success body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GraphApiError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self.http.get(&url).query(query).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GraphApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn fetch_feed(&self, session: &Session) -> Result<FeedPage, GraphApiError> {
        debug!("fetching feed page");
        self.get_json(
            "me/feed",
            &[("fields", FEED_FIELDS), ("access_token", &session.token)],
        )
        .await
    }

    async fn fetch_image(
        &self,
        session: &Session,
        object_id: &str,
    ) -> Result<ImageObject, GraphApiError> {
        debug!(object_id, "fetching image object");
        self.get_json(
            object_id,
            &[("fields", IMAGE_FIELDS), ("access_token", &session.token)],
        )
        .await
    }

    async fn exchange_token(&self, session: &Session) -> Result<ExchangedToken, GraphApiError> {
        self.get_json(
            "oauth/access_token",
            &[
                ("grant_type", "fb_exchange_token"),
                ("client_id", &session.app_id),
                ("client_secret", &session.app_secret),
                ("fb_exchange_token", &session.token),
            ],
        )
        .await
    }

    async fn redeem_code(
        &self,
        app_id: &str,
        app_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<String, GraphApiError> {
        let redeemed: RedeemedCode = self
            .get_json(
                "oauth/access_token",
                &[
                    ("client_id", app_id),
                    ("client_secret", app_secret),
                    ("redirect_uri", redirect_uri),
                    ("code", code),
                ],
            )
            .await?;
        Ok(redeemed.access_token)
    }

    async fn subscribe(
        &self,
        app_id: &str,
        app_secret: &str,
        callback_url: &str,
        verify_token: &str,
    ) -> Result<serde_json::Value, GraphApiError> {
        // Subscriptions are managed with the app access token, not a user one.
        let app_token = format!("{app_id}|{app_secret}");
        let url = format!("{}/{}/subscriptions", self.base_url, app_id);
        let response = self
            .http
            .post(&url)
            .query(&[
                ("object", "user"),
                ("callback_url", callback_url),
                ("fields", SUBSCRIPTION_FIELDS),
                ("include_values", "true"),
                ("verify_token", verify_token),
                ("access_token", &app_token),
            ])
            .send()
            .await?;
        Self::decode(response).await
    }
}

/// Parses a webhook body into a change notification.
///
/// Malformed bodies decode to the default (empty `object`), matching the
/// listener contract of treating them as a benign no-op.
pub fn parse_change_notification(body: &[u8]) -> ChangeNotification {
    serde_json::from_slice(body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_change_notification_valid() {
        let body = br#"{"object":"user","entry":[{"id":"1","uid":"1","time":123}]}"#;
        let notification = parse_change_notification(body);
        assert_eq!(notification.object, "user");
        assert_eq!(notification.entry.len(), 1);
    }

    #[test]
    fn parse_change_notification_garbage_is_empty() {
        let notification = parse_change_notification(b"not json at all");
        assert!(notification.object.is_empty());
    }

    #[test]
    fn parse_change_notification_missing_object_is_empty() {
        let notification = parse_change_notification(br#"{"entry":[]}"#);
        assert!(notification.object.is_empty());
    }
}
