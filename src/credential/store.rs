//! Filesystem persistence for the credential record.
//!
//! The record lives in a single JSON file with owner-only permissions. A
//! load that fails for any reason (missing file, unreadable, bad JSON) means
//! "no stored credential" and triggers interactive authorization instead of
//! being an error.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// The long-lived access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    /// Absolute expiry instant, computed from the remote's `expires_in`.
    pub expires_at: DateTime<Utc>,
}

/// Errors raised while persisting a credential.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Load/save access to the single credential slot.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CredentialStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored credential, or `None` when there is none usable.
    pub fn load(&self) -> Option<Credential> {
        let bytes = fs::read(&self.path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(credential) => Some(credential),
            Err(error) => {
                debug!(%error, path = %self.path.display(), "stored credential unreadable");
                None
            }
        }
    }

    /// Writes the credential with owner-only permissions.
    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(credential)?;
        fs::write(&self.path, bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn credential() -> Credential {
        Credential {
            token: "long-lived-token".to_string(),
            expires_at: Utc::now() + Duration::days(60),
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credential.json"));

        let original = credential();
        store.save(&original).unwrap();

        assert_eq!(store.load(), Some(original));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credential.json"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn corrupt_file_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credential.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = CredentialStore::new(&path);
        assert_eq!(store.load(), None);
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("credential.json");
        let store = CredentialStore::new(&path);
        store.save(&credential()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credential.json"));

        store.save(&credential()).unwrap();
        let newer = Credential {
            token: "refreshed-token".to_string(),
            expires_at: Utc::now() + Duration::days(90),
        };
        store.save(&newer).unwrap();

        assert_eq!(store.load(), Some(newer));
    }
}
