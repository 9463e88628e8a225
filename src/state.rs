//! # Client State
//!
//! The long-lived object behind the command loop. It owns the collaborators
//! every ceremony needs (relying party, platform authenticator, presentation)
//! and the ceremony policy, and makes sure only one ceremony runs at a time.
//!
//! ## Why only one?
//! The platform credential API cannot serve two `create`/`get` calls for the
//! same page at once, so a second submission is rejected instead of interleaved.

use crate::ceremony::{run_ceremony, Ceremony, CeremonyContext, CeremonyOutcome};
use crate::error::CeremonyError;
use crate::platform::PlatformAuthenticator;
use crate::presentation::StatusSink;
use crate::transport::RelyingParty;
use crate::webauthn::authentication::Authentication;
use crate::webauthn::registration::Registration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Upper bound on platform calls; a server `timeout` can only shorten it
pub const DEFAULT_CEREMONY_TIMEOUT: Duration = Duration::from_secs(120);

pub struct CeremonyClient<R> {
    relying_party: R,
    platform: Arc<dyn PlatformAuthenticator>,
    presentation: Arc<dyn StatusSink>,
    registration: Registration,
    authentication: Authentication,
    ceremony_timeout: Duration,
    /// Held for the whole duration of a ceremony
    in_flight: Mutex<()>,
}

impl<R: RelyingParty> CeremonyClient<R> {
    pub fn new(
        relying_party: R,
        platform: Arc<dyn PlatformAuthenticator>,
        presentation: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            relying_party,
            platform,
            presentation,
            registration: Registration::default(),
            authentication: Authentication::default(),
            ceremony_timeout: DEFAULT_CEREMONY_TIMEOUT,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_registration(mut self, registration: Registration) -> Self {
        self.registration = registration;
        self
    }

    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn with_ceremony_timeout(mut self, timeout: Duration) -> Self {
        self.ceremony_timeout = timeout;
        self
    }

    /// Create a passkey for `username`
    pub async fn register(&self, username: &str) -> CeremonyOutcome {
        self.run(&self.registration, username).await
    }

    /// Sign in as `username` with an existing passkey
    pub async fn authenticate(&self, username: &str) -> CeremonyOutcome {
        self.run(&self.authentication, username).await
    }

    async fn run<C: Ceremony>(&self, ceremony: &C, username: &str) -> CeremonyOutcome {
        let mut context = CeremonyContext::new(C::NAME, username);

        let Ok(_guard) = self.in_flight.try_lock() else {
            let error = CeremonyError::AlreadyInProgress;
            tracing::warn!(ceremony = C::NAME, username, "rejected: another ceremony is running");
            self.presentation
                .error(&error.user_message(), &error.to_string());
            context.abort(&error);
            return CeremonyOutcome {
                context,
                error: Some(error),
            };
        };

        self.presentation.loading(C::NAME, username);
        let outcome = run_ceremony(
            ceremony,
            &self.relying_party,
            self.platform.as_ref(),
            context,
            self.ceremony_timeout,
        )
        .await;

        match &outcome.error {
            None => self.presentation.success(C::NAME, username),
            Some(error) => self
                .presentation
                .error(&error.user_message(), &error.to_string()),
        }
        outcome
    }
}
