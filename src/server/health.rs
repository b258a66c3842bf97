//! Liveness and interactive-authorization endpoints.

use axum::extract::Query;
use serde::Deserialize;

/// `GET /` - liveness probe.
pub async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub code: String,
}

/// `GET /token` - authorization redirect target.
///
/// Echoes the login code so the operator can copy it into the stdin prompt.
pub async fn token_handler(Query(params): Query<TokenParams>) -> String {
    format!("code: {}", params.code)
}
