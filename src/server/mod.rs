//! HTTP surface of the bridge.
//!
//! The listener stays minimal: it acknowledges everything quickly and never
//! lets a pipeline failure leak into a response, because the remote sender
//! retries on anything that looks like an error.
//!
//! # Endpoints
//!
//! - `GET /` - liveness, returns `OK`
//! - `GET /token?code=…` - interactive authorization callback, echoes the
//!   code for operator copy-paste
//! - `GET /webhook?hub.challenge=…` - subscription handshake, echoes the
//!   challenge
//! - `POST /webhook` - change notification; always returns 200 and, for a
//!   well-formed body, dispatches one pipeline run without blocking

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::routing::get;
use tracing::warn;

use crate::pipeline::PipelineDispatcher;

pub mod health;
pub mod webhook;

pub use health::{health_handler, token_handler};
pub use webhook::{verify_handler, webhook_handler};

/// Shared listener state, passed to handlers via axum's `State` extractor.
///
/// The dispatcher is wired in after bootstrap finishes (the server must
/// already be up to serve the interactive authorization callback).
/// Notifications arriving before that are acknowledged and dropped.
#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Default)]
struct AppStateInner {
    dispatcher: OnceLock<Arc<dyn PipelineDispatcher>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires in the pipeline dispatcher. Later calls are ignored.
    pub fn set_dispatcher(&self, dispatcher: Arc<dyn PipelineDispatcher>) {
        if self.inner.dispatcher.set(dispatcher).is_err() {
            warn!("pipeline dispatcher already set");
        }
    }

    /// Fires one pipeline run, if the pipeline is ready.
    pub(crate) fn dispatch(&self) {
        match self.inner.dispatcher.get() {
            Some(dispatcher) => dispatcher.dispatch(),
            None => warn!("notification before pipeline ready; dropped"),
        }
    }
}

/// Builds the axum router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/token", get(token_handler))
        .route("/webhook", get(verify_handler).post(webhook_handler))
        .with_state(state)
}
