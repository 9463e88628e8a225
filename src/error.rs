//! # Error Handling
//!
//! This module defines the error types a ceremony can fail with and how each
//! one is turned into a message for the person at the keyboard.
//!
//! ## Error Kinds
//! - **Encoding**: a binary field could not be coerced (always names the field)
//! - **Transport**: the relying party could not be reached, answered with a
//!   non-2xx status, or sent something that is not the expected JSON
//! - **ServerVerdict**: the relying party answered `status: "error"`
//! - **CeremonyRejected**: the platform authenticator declined the request
//!
//! No error escapes a ceremony flow: each stage converts its failure into a
//! `CeremonyError` and the flow moves to `Aborted`.

use crate::platform::PlatformRejection;
use thiserror::Error;

/// Failure of one of the two HTTP round-trips of a ceremony
///
/// Kept apart from [`CeremonyError::ServerVerdict`]: a transport error means we
/// never got a usable answer, a verdict error means the server answered and said no.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request never produced a response (connection refused, DNS, timeout)
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status code
    #[error("{path} answered HTTP {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    /// The body was not JSON, or not the JSON shape we expected
    #[error("{path} returned malformed JSON: {reason}")]
    MalformedJson { path: String, reason: String },
}

/// Everything that can abort a ceremony
///
/// The `#[from]` conversions let each stage use `?` on transport and
/// platform calls; the flow catches the result and records the abort.
#[derive(Error, Debug)]
pub enum CeremonyError {
    /// A binary field was neither base64url text, a byte array nor a buffer
    #[error("could not coerce '{field}' to binary: {reason}")]
    Encoding { field: String, reason: String },

    /// Network/HTTP failure talking to the relying party
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Explicit `status: "error"` from the relying party
    #[error("server rejected the request: {0}")]
    ServerVerdict(String),

    /// The platform authenticator refused, timed out, or the user cancelled
    #[error("authenticator rejected the ceremony: {0}")]
    CeremonyRejected(#[from] PlatformRejection),

    /// A second ceremony was submitted while one is still running
    #[error("a ceremony is already in progress")]
    AlreadyInProgress,
}

/// Discriminant of [`CeremonyError`], handy for tests and log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Encoding,
    Transport,
    ServerVerdict,
    CeremonyRejected,
    Busy,
}

impl CeremonyError {
    /// Shorthand used by the coercion layer
    pub fn encoding(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CeremonyError::Encoding {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CeremonyError::Encoding { .. } => ErrorKind::Encoding,
            CeremonyError::Transport(_) => ErrorKind::Transport,
            CeremonyError::ServerVerdict(_) => ErrorKind::ServerVerdict,
            CeremonyError::CeremonyRejected(_) => ErrorKind::CeremonyRejected,
            CeremonyError::AlreadyInProgress => ErrorKind::Busy,
        }
    }

    /// The single message shown to the user
    ///
    /// Server messages and authenticator rejection reasons are passed through
    /// verbatim; the full `Display` output is kept for the diagnostic footer.
    pub fn user_message(&self) -> String {
        match self {
            CeremonyError::Encoding { field, .. } => {
                format!("Received data could not be decoded (field '{}')", field)
            }
            CeremonyError::Transport(_) => {
                "Could not communicate with the server".to_string()
            }
            CeremonyError::ServerVerdict(message) => message.clone(),
            CeremonyError::CeremonyRejected(reason) => {
                format!("The authenticator did not complete the request: {}", reason)
            }
            CeremonyError::AlreadyInProgress => {
                "Please wait for the current request to finish".to_string()
            }
        }
    }
}

/// Convenience alias, same shape as the rest of the crate uses
pub type CeremonyResult<T> = Result<T, CeremonyError>;
