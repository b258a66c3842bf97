//! Graph API client and feed resolution.
//!
//! The remote feed is consumed through the [`GraphApi`] trait so the pipeline
//! can be exercised against stubs in tests; [`client::GraphClient`] is the
//! real HTTP implementation.

pub mod client;
pub mod resolver;
pub mod types;

pub use client::{GraphApi, GraphApiError, GraphClient};
pub use resolver::{FeedResolver, ResolveError, ResolvedImage, ResolvedPost};

/// A short-lived handle over the current valid credential.
///
/// Rebuilt whenever the credential is refreshed; a pipeline run takes one
/// clone at its start and uses it for the whole run.
#[derive(Debug, Clone)]
pub struct Session {
    pub app_id: String,
    pub app_secret: String,
    pub token: String,
}

impl Session {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Session {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            token: token.into(),
        }
    }
}
