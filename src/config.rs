//! # Configuration Management
//!
//! This module loads the client configuration from environment variables.
//! A `.env` file in the working directory is read first, if there is one.
//!
//! ## Environment Variables
//! - `RP_URL`: Base URL of the relying party (default: http://localhost:5000)
//! - `RP_ORIGIN`: Origin written into clientDataJSON (default: same as `RP_URL`)
//! - `ATTESTATION_TYPE`: `attType` sent when registering (default: none)
//! - `AUTHENTICATOR_ATTACHMENT`: `authType` sent when registering (default: no preference)
//! - `USER_VERIFICATION`: user verification requirement (default: preferred)
//! - `RESIDENT_KEY`: resident key requirement (default: discouraged)
//! - `REQUEST_TIMEOUT_SECS`: HTTP timeout per request (default: 30)
//! - `CEREMONY_TIMEOUT_SECS`: platform call limit if the server sends none (default: 120)

use crate::webauthn::authentication::Authentication;
use crate::webauthn::registration::Registration;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Client configuration
///
/// Command-line flags override these values after loading (see `main.rs`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the relying party; the `/api/...` paths are appended to it
    pub rp_url: String,

    /// Origin the software authenticator claims in clientDataJSON
    ///
    /// Must match what the relying party expects, e.g. "https://example.com".
    pub rp_origin: String,

    /// Attestation conveyance preference: "none", "indirect" or "direct"
    pub attestation_type: String,

    /// "platform", "cross-platform", or empty for no preference
    pub authenticator_attachment: String,

    /// "required", "preferred" or "discouraged"
    pub user_verification: String,

    /// "required", "preferred" or "discouraged"
    pub resident_key: String,

    pub request_timeout_secs: u64,

    pub ceremony_timeout_secs: u64,
}

impl Config {
    /// Load configuration from the process environment (and `.env`)
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key/value source, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let rp_url = lookup("RP_URL").unwrap_or_else(|| "http://localhost:5000".to_string());

        Ok(Config {
            rp_origin: lookup("RP_ORIGIN").unwrap_or_else(|| rp_url.clone()),
            rp_url,
            attestation_type: lookup("ATTESTATION_TYPE").unwrap_or_else(|| "none".to_string()),
            authenticator_attachment: lookup("AUTHENTICATOR_ATTACHMENT").unwrap_or_default(),
            user_verification: lookup("USER_VERIFICATION")
                .unwrap_or_else(|| "preferred".to_string()),
            resident_key: lookup("RESIDENT_KEY").unwrap_or_else(|| "discouraged".to_string()),
            request_timeout_secs: lookup("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be a whole number of seconds")?,
            ceremony_timeout_secs: lookup("CEREMONY_TIMEOUT_SECS")
                .unwrap_or_else(|| "120".to_string())
                .parse()
                .context("CEREMONY_TIMEOUT_SECS must be a whole number of seconds")?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ceremony_timeout(&self) -> Duration {
        Duration::from_secs(self.ceremony_timeout_secs)
    }

    /// Registration policy sent with every `makeCredentialOptions` request
    pub fn registration(&self) -> Registration {
        Registration {
            attestation: self.attestation_type.clone(),
            authenticator_attachment: self.authenticator_attachment.clone(),
            user_verification: self.user_verification.clone(),
            resident_key: self.resident_key.clone(),
        }
    }

    pub fn authentication(&self) -> Authentication {
        Authentication {
            user_verification: self.user_verification.clone(),
        }
    }
}
