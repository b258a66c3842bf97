//! Token lifecycle: ownership of the credential and the refresh loop.
//!
//! The refresher owns the only mutable copy of the credential and the
//! session derived from it. Pipeline runs take a session snapshot through
//! [`TokenRefresher::current_session`]; the background loop wakes once a
//! minute and exchanges the token whenever less than a week of validity
//! remains. A failed exchange is fatal - there is no retry or backoff, the
//! operator must reauthorize (deliberate simplicity, not an oversight).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::graph::{GraphApi, GraphApiError, Session};

use super::store::{Credential, CredentialStore};

/// How often the refresh loop wakes to check remaining validity.
pub const REFRESH_CHECK_PERIOD: Duration = Duration::from_secs(60);

/// Remaining validity below which the token is exchanged.
const REFRESH_THRESHOLD_DAYS: i64 = 7;

/// Errors that terminate the refresh loop (and the process).
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The remote token exchange failed. An unrefreshable credential makes
    /// the whole system useless, so this is fatal.
    #[error("token exchange failed: {0}")]
    Exchange(#[from] GraphApiError),
}

/// Returns whether a credential expiring at `expires_at` should be
/// exchanged now.
pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at - now < chrono::Duration::days(REFRESH_THRESHOLD_DAYS)
}

struct Shared {
    credential: Credential,
    session: Session,
}

/// Owns the long-lived credential and keeps it valid.
pub struct TokenRefresher<A> {
    api: Arc<A>,
    store: CredentialStore,
    app_id: String,
    app_secret: String,
    // Readers observe either the old or the fully-refreshed state, never a
    // torn one; refresh swaps both fields under the write lock.
    state: RwLock<Shared>,
}

impl<A: GraphApi> TokenRefresher<A> {
    pub fn new(
        api: Arc<A>,
        store: CredentialStore,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        credential: Credential,
    ) -> Self {
        let app_id = app_id.into();
        let app_secret = app_secret.into();
        let session = Session::new(&app_id, &app_secret, &credential.token);
        TokenRefresher {
            api,
            store,
            app_id,
            app_secret,
            state: RwLock::new(Shared {
                credential,
                session,
            }),
        }
    }

    /// A session over the currently valid credential.
    pub async fn current_session(&self) -> Session {
        self.state.read().await.session.clone()
    }

    /// The absolute expiry of the current credential.
    pub async fn expires_at(&self) -> DateTime<Utc> {
        self.state.read().await.credential.expires_at
    }

    /// Exchanges the current token for a fresh long-lived one, persists it,
    /// and rebuilds the session.
    ///
    /// A failed persist is logged and the in-memory copy stays
    /// authoritative; only the remote exchange itself is fatal.
    pub async fn refresh(&self) -> Result<Credential, RefreshError> {
        let session = self.current_session().await;
        let exchanged = self.api.exchange_token(&session).await?;

        let credential = Credential {
            expires_at: Utc::now() + chrono::Duration::seconds(exchanged.expires_in),
            token: exchanged.access_token,
        };

        if let Err(error) = self.store.save(&credential) {
            warn!(%error, "credential write failed; keeping refreshed token in memory");
        }

        let mut state = self.state.write().await;
        state.session = Session::new(&self.app_id, &self.app_secret, &credential.token);
        state.credential = credential.clone();
        drop(state);

        info!(expires_at = %credential.expires_at, "access token refreshed");
        Ok(credential)
    }

    /// One scheduling tick: refresh if the threshold has been crossed.
    ///
    /// Returns whether a refresh was performed.
    pub async fn tick(&self) -> Result<bool, RefreshError> {
        let expires_at = self.expires_at().await;
        if !needs_refresh(expires_at, Utc::now()) {
            debug!(%expires_at, "token still valid");
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    /// Runs the refresh loop until cancelled or a fatal exchange failure.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RefreshError> {
        let mut interval = tokio::time::interval(REFRESH_CHECK_PERIOD);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("refresh loop cancelled");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }
            self.tick().await?;
        }
    }
}
