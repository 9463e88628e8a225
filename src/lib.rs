//! # Passkey Ceremony Client
//!
//! Client-side orchestration of WebAuthn/passkey ceremonies against a
//! relying party that speaks the `makeCredentialOptions` / `makeCredential` /
//! `assertionOptions` / `makeAssertion` JSON API.
//!
//! ## Key Concepts
//! - **Ceremony**: one registration or authentication, four stages long
//! - **Relying party**: the server that issues challenges and verifies results
//! - **Platform authenticator**: whatever holds the private keys
//!
//! ## Example
//! ```no_run
//! use passkey_ceremony_client::platform::software::{AutoPresence, SoftwareAuthenticator};
//! use passkey_ceremony_client::presentation::TerminalStatus;
//! use passkey_ceremony_client::state::CeremonyClient;
//! use passkey_ceremony_client::transport::HttpRelyingParty;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use url::Url;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let url = Url::parse("http://localhost:5000")?;
//! let relying_party = HttpRelyingParty::new(url.clone(), Duration::from_secs(30))?;
//! let platform = Arc::new(SoftwareAuthenticator::new(url, Arc::new(AutoPresence(true))));
//! let client = CeremonyClient::new(relying_party, platform, Arc::new(TerminalStatus));
//!
//! let outcome = client.register("alice").await;
//! assert!(outcome.is_done());
//! # Ok(())
//! # }
//! ```

pub mod ceremony;
pub mod config;
pub mod encoding;
pub mod error;
pub mod platform;
pub mod presentation;
pub mod state;
pub mod transport;
pub mod webauthn;
