//! # Platform Credential API
//!
//! The boundary to whatever actually owns the keys: a browser, an OS passkey
//! provider, a roaming security key, or the software authenticator in
//! [`software`]. The ceremony flow only needs two entry points.
//!
//! Either call may be refused. Refusals are ordinary values
//! ([`PlatformRejection`]), never panics, so the flow can abort cleanly.

pub mod software;

use crate::webauthn::types::{
    AssertionCredential, PublicKeyCredentialCreationOptions, PublicKeyCredentialRequestOptions,
    RegistrationCredential,
};
use async_trait::async_trait;
use thiserror::Error;

/// Why the platform did not produce a credential
///
/// The `Display` text is shown to the user as part of the abort message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformRejection {
    /// The user declined the prompt or cancelled it
    #[error("{0}")]
    NotAllowed(String),

    /// Nobody answered in time
    #[error("the operation timed out")]
    TimedOut,

    /// Duplicate registration: the authenticator already holds an excluded credential
    #[error("{0}")]
    InvalidState(String),

    /// No held credential matches the request
    #[error("no matching credential was found on this authenticator")]
    NoMatchingCredential,

    /// Requested algorithm, attachment or option cannot be honoured
    #[error("not supported: {0}")]
    NotSupported(String),
}

/// `navigator.credentials.create()` / `navigator.credentials.get()` in trait form
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Create a new credential (registration)
    async fn create(
        &self,
        options: PublicKeyCredentialCreationOptions,
    ) -> Result<RegistrationCredential, PlatformRejection>;

    /// Produce an assertion with an existing credential (authentication)
    async fn get(
        &self,
        options: PublicKeyCredentialRequestOptions,
    ) -> Result<AssertionCredential, PlatformRejection>;
}
