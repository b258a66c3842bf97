//! switchfeed - bridges Nintendo Switch share posts from a Facebook feed to
//! local storage and, optionally, a Mastodon account.
//!
//! A Graph API webhook triggers one pipeline run: resolve the newest share
//! post, deduplicate against the in-memory watermark, download its images,
//! and republish them if mastodon mode is enabled.

pub mod config;
pub mod credential;
pub mod dedupe;
pub mod fetch;
pub mod graph;
pub mod mastodon;
pub mod pipeline;
pub mod server;
pub mod types;
