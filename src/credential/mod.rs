//! Long-lived credential management.
//!
//! One credential record authorizes the whole system. It is loaded once at
//! startup (or created interactively on first run), persisted on every
//! refresh, and kept valid by a background loop that exchanges it before
//! expiry.

pub mod authorize;
pub mod refresher;
pub mod store;

pub use authorize::{AuthorizeError, interactive_authorize};
pub use refresher::{REFRESH_CHECK_PERIOD, RefreshError, TokenRefresher, needs_refresh};
pub use store::{Credential, CredentialStore, StoreError};
