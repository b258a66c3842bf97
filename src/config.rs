//! Environment configuration.
//!
//! All configuration comes from environment variables, read once at startup.
//! Missing required variables are a fatal startup error; the Mastodon
//! variables are only required when mastodon mode is enabled.
//!
//! # Variables
//!
//! - `FACEBOOK_APP_ID`, `FACEBOOK_APP_SECRET` - Graph API application identity
//! - `SWITCHFEED_BASE_URL` - externally reachable base URL for webhook callbacks
//! - `SWITCHFEED_MODE` - comma-separated mode flags: `save` keeps downloaded
//!   images on disk, `mastodon` republishes them
//! - `MASTODON_BASE_URL`, `MASTODON_ACCESS_TOKEN` - publishing target

use std::env;

use thiserror::Error;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
}

/// Operating mode flags parsed from `SWITCHFEED_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mode {
    /// Keep downloaded images on disk after a run.
    pub save: bool,
    /// Republish downloaded images to the configured Mastodon account.
    pub mastodon: bool,
}

impl Mode {
    /// Parses a comma-separated mode list such as `"save,mastodon"`.
    ///
    /// Unknown flags are ignored; surrounding whitespace is tolerated.
    pub fn parse(spec: &str) -> Self {
        let mut mode = Mode::default();
        for flag in spec.split(',') {
            match flag.trim() {
                "save" => mode.save = true,
                "mastodon" => mode.mastodon = true,
                _ => {}
            }
        }
        mode
    }
}

/// Connection settings for the Mastodon publishing target.
#[derive(Debug, Clone)]
pub struct MastodonConfig {
    pub base_url: String,
    pub access_token: String,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_id: String,
    pub app_secret: String,
    /// Externally reachable base URL; `/webhook` and `/token` are appended.
    pub base_url: String,
    pub mode: Mode,
    /// Present exactly when `mode.mastodon` is set.
    pub mastodon: Option<MastodonConfig>,
}

impl Config {
    /// Reads configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_id = require("FACEBOOK_APP_ID")?;
        let app_secret = require("FACEBOOK_APP_SECRET")?;
        let base_url = require("SWITCHFEED_BASE_URL")?;
        let mode = Mode::parse(&require("SWITCHFEED_MODE")?);

        let mastodon = if mode.mastodon {
            Some(MastodonConfig {
                base_url: require("MASTODON_BASE_URL")?,
                access_token: require("MASTODON_ACCESS_TOKEN")?,
            })
        } else {
            None
        };

        Ok(Config {
            app_id,
            app_secret,
            base_url,
            mode,
            mastodon,
        })
    }
}

/// Reads a required environment variable, treating empty values as missing.
fn require(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_single_flags() {
        assert_eq!(
            Mode::parse("save"),
            Mode {
                save: true,
                mastodon: false
            }
        );
        assert_eq!(
            Mode::parse("mastodon"),
            Mode {
                save: false,
                mastodon: true
            }
        );
    }

    #[test]
    fn mode_parse_combined_with_whitespace() {
        let mode = Mode::parse(" save , mastodon ");
        assert!(mode.save);
        assert!(mode.mastodon);
    }

    #[test]
    fn mode_parse_ignores_unknown_flags() {
        let mode = Mode::parse("save,telegram");
        assert!(mode.save);
        assert!(!mode.mastodon);
    }

    #[test]
    fn mode_parse_empty_is_disabled() {
        assert_eq!(Mode::parse(""), Mode::default());
    }
}
