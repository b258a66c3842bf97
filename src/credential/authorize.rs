//! Interactive first-run authorization.
//!
//! When no credential is stored, the operator logs in through the OAuth
//! dialog and pastes the resulting code back on stdin. The code is redeemed
//! for a short-lived token, which is immediately exchanged for the
//! long-lived credential.

use std::io::Write;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::graph::{GraphApi, GraphApiError, Session};

use super::store::Credential;

/// OAuth scopes requested for the feed account.
const OAUTH_SCOPE: &str = "public_profile,user_posts,user_photos,user_videos";

/// Errors during interactive authorization.
#[derive(Debug, Error)]
pub enum AuthorizeError {
    /// Reading the pasted code from stdin failed.
    #[error("could not read login code: {0}")]
    Stdin(#[from] std::io::Error),

    /// The stdin reader task was torn down.
    #[error("login code reader failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The pasted code was rejected by the remote.
    #[error("login code rejected: {0}")]
    Code(GraphApiError),

    /// The long-lived exchange of the fresh token failed.
    #[error("token exchange failed: {0}")]
    Exchange(GraphApiError),
}

/// The login dialog URL the operator must visit.
pub fn login_dialog_url(app_id: &str, redirect_uri: &str) -> String {
    format!(
        "https://www.facebook.com/dialog/oauth?client_id={app_id}&redirect_uri={redirect_uri}&scope={OAUTH_SCOPE}"
    )
}

/// Walks the operator through the login dialog and returns a long-lived
/// credential.
///
/// The redirect lands on `<base_url>/token`, which echoes the code for
/// copy-paste while this prompt waits on stdin.
pub async fn interactive_authorize<A: GraphApi>(
    api: &A,
    app_id: &str,
    app_secret: &str,
    base_url: &str,
) -> Result<Credential, AuthorizeError> {
    let redirect_uri = format!("{base_url}/token");

    println!("{}", login_dialog_url(app_id, &redirect_uri));
    println!("visit the URL above, log in, and paste the code from the redirect");
    print!("code: ");
    std::io::stdout().flush()?;

    let code = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;
    let code = code.trim();
    debug!("login code received, redeeming");

    let short_token = api
        .redeem_code(app_id, app_secret, &redirect_uri, code)
        .await
        .map_err(AuthorizeError::Code)?;

    let session = Session::new(app_id, app_secret, short_token);
    let exchanged = api
        .exchange_token(&session)
        .await
        .map_err(AuthorizeError::Exchange)?;

    Ok(Credential {
        expires_at: Utc::now() + chrono::Duration::seconds(exchanged.expires_in),
        token: exchanged.access_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialog_url_carries_app_and_redirect() {
        let url = login_dialog_url("12345", "https://feed.example/token");
        assert!(url.starts_with("https://www.facebook.com/dialog/oauth?"));
        assert!(url.contains("client_id=12345"));
        assert!(url.contains("redirect_uri=https://feed.example/token"));
        assert!(url.contains("scope=public_profile,user_posts,user_photos,user_videos"));
    }
}
