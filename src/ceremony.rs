//! # Ceremony State Machine
//!
//! One generic flow drives both registration and authentication:
//!
//! ```text
//! Idle → AwaitingOptions → OptionsReady → AwaitingCeremony
//!      → CeremonyComplete → AwaitingVerification → Done
//! ```
//!
//! Any non-terminal state can fall into `Aborted(reason)`. The flow only moves
//! forward; the user restarts a ceremony to try again. The per-ceremony
//! differences (which endpoints, how to decode options, `create` vs `get`,
//! how to encode the result) live behind the [`Ceremony`] trait.

use crate::error::{CeremonyError, CeremonyResult, TransportError};
use crate::platform::{PlatformAuthenticator, PlatformRejection};
use crate::transport::RelyingParty;
use crate::webauthn::types::ServerVerdict;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Where a ceremony currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CeremonyState {
    Idle,
    AwaitingOptions,
    OptionsReady,
    AwaitingCeremony,
    CeremonyComplete,
    AwaitingVerification,
    Done,
    /// Terminal failure; carries the message shown to the user
    Aborted(String),
}

impl CeremonyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CeremonyState::Done | CeremonyState::Aborted(_))
    }

    /// Legal single-step transitions
    pub fn can_advance_to(&self, next: &CeremonyState) -> bool {
        use CeremonyState::*;
        match (self, next) {
            (current, Aborted(_)) => !current.is_terminal(),
            (Idle, AwaitingOptions)
            | (AwaitingOptions, OptionsReady)
            | (OptionsReady, AwaitingCeremony)
            | (AwaitingCeremony, CeremonyComplete)
            | (CeremonyComplete, AwaitingVerification)
            | (AwaitingVerification, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CeremonyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CeremonyState::Aborted(reason) => write!(f, "Aborted({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Everything one ceremony knows about itself
///
/// Created fresh for each user action and dropped once the outcome has been
/// shown; nothing here outlives the ceremony.
#[derive(Debug, Clone)]
pub struct CeremonyContext {
    pub ceremony: &'static str,
    pub username: String,
    state: CeremonyState,
    history: Vec<CeremonyState>,
}

impl CeremonyContext {
    pub fn new(ceremony: &'static str, username: impl Into<String>) -> Self {
        Self {
            ceremony,
            username: username.into(),
            state: CeremonyState::Idle,
            history: vec![CeremonyState::Idle],
        }
    }

    pub fn state(&self) -> &CeremonyState {
        &self.state
    }

    /// Every state visited, in order, starting with `Idle`
    pub fn history(&self) -> &[CeremonyState] {
        &self.history
    }

    fn advance(&mut self, next: CeremonyState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(
            ceremony = self.ceremony,
            username = %self.username,
            from = %self.state,
            to = %next,
            "ceremony transition"
        );
        self.history.push(next.clone());
        self.state = next;
    }

    pub(crate) fn abort(&mut self, error: &CeremonyError) {
        if self.state.is_terminal() {
            return;
        }
        tracing::warn!(
            ceremony = self.ceremony,
            username = %self.username,
            stage = %self.state,
            kind = ?error.kind(),
            "ceremony aborted: {}",
            error
        );
        self.advance(CeremonyState::Aborted(error.user_message()));
    }
}

/// The per-ceremony capabilities the generic flow is parametrized by
///
/// `build_options` / `invoke_platform` / `build_result` are the only places
/// where registration and authentication differ.
#[async_trait]
pub trait Ceremony: Send + Sync {
    /// Form body of the option request
    type Form: Serialize + Send + Sync;
    /// Decoded options handed to the platform
    type Options: Send;
    /// Raw platform result
    type Credential: Send;
    /// JSON body submitted for verification
    type Submission: Serialize + Send + Sync;

    /// Human-readable name, used in logs and status messages
    const NAME: &'static str;
    const OPTIONS_PATH: &'static str;
    const RESULT_PATH: &'static str;

    fn build_options(&self, username: &str) -> Self::Form;

    /// Check the server status and turn the option document into bytes
    fn decode_options(&self, document: Value) -> CeremonyResult<Self::Options>;

    /// Timeout requested by the server, if any (see [`platform_time_limit`])
    fn requested_timeout(&self, options: &Self::Options) -> Option<Duration>;

    async fn invoke_platform(
        &self,
        platform: &dyn PlatformAuthenticator,
        options: Self::Options,
    ) -> Result<Self::Credential, PlatformRejection>;

    /// Re-encode every binary member as base64url
    fn build_result(&self, credential: Self::Credential) -> Self::Submission;
}

/// Shortest platform call a server-supplied `timeout` can ask for
pub const MIN_CEREMONY_TIMEOUT: Duration = Duration::from_secs(1);

/// How long the platform call may take
///
/// The server's `timeout` is a hint, clamped to
/// `MIN_CEREMONY_TIMEOUT..=default_timeout`.
pub fn platform_time_limit(requested: Option<Duration>, default_timeout: Duration) -> Duration {
    match requested {
        Some(requested) => {
            requested.clamp(MIN_CEREMONY_TIMEOUT, default_timeout.max(MIN_CEREMONY_TIMEOUT))
        }
        None => default_timeout,
    }
}

/// Result of one ceremony; never an `Err`, failures are in `error`
#[derive(Debug)]
pub struct CeremonyOutcome {
    pub context: CeremonyContext,
    pub error: Option<CeremonyError>,
}

impl CeremonyOutcome {
    pub fn is_done(&self) -> bool {
        *self.context.state() == CeremonyState::Done
    }

    pub fn state(&self) -> &CeremonyState {
        self.context.state()
    }
}

/// Drive one ceremony from `Idle` to `Done` or `Aborted`
///
/// Every stage failure is caught here and recorded in the context; nothing
/// propagates past this function.
pub async fn run_ceremony<C, R>(
    ceremony: &C,
    relying_party: &R,
    platform: &dyn PlatformAuthenticator,
    mut context: CeremonyContext,
    default_timeout: Duration,
) -> CeremonyOutcome
where
    C: Ceremony,
    R: RelyingParty,
{
    match drive(ceremony, relying_party, platform, &mut context, default_timeout).await {
        Ok(()) => {
            tracing::info!(
                ceremony = context.ceremony,
                username = %context.username,
                "ceremony succeeded"
            );
            CeremonyOutcome {
                context,
                error: None,
            }
        }
        Err(error) => {
            context.abort(&error);
            CeremonyOutcome {
                context,
                error: Some(error),
            }
        }
    }
}

async fn drive<C, R>(
    ceremony: &C,
    relying_party: &R,
    platform: &dyn PlatformAuthenticator,
    context: &mut CeremonyContext,
    default_timeout: Duration,
) -> CeremonyResult<()>
where
    C: Ceremony,
    R: RelyingParty,
{
    // Stage 1: option request
    context.advance(CeremonyState::AwaitingOptions);
    let form = ceremony.build_options(&context.username);
    let document = relying_party.post_form(C::OPTIONS_PATH, &form).await?;

    // Stage 2: option decoding
    let options = ceremony.decode_options(document)?;
    context.advance(CeremonyState::OptionsReady);

    // Stage 3: platform ceremony, bounded so it can never hang
    let limit = platform_time_limit(ceremony.requested_timeout(&options), default_timeout);
    context.advance(CeremonyState::AwaitingCeremony);
    let credential = tokio::time::timeout(limit, ceremony.invoke_platform(platform, options))
        .await
        .map_err(|_| PlatformRejection::TimedOut)??;
    context.advance(CeremonyState::CeremonyComplete);

    // Stage 4: encode, submit, interpret the verdict
    let submission = ceremony.build_result(credential);
    context.advance(CeremonyState::AwaitingVerification);
    let answer = relying_party.post_json(C::RESULT_PATH, &submission).await?;
    let verdict: ServerVerdict =
        serde_json::from_value(answer).map_err(|e| TransportError::MalformedJson {
            path: C::RESULT_PATH.to_string(),
            reason: e.to_string(),
        })?;
    verdict.into_result()?;
    context.advance(CeremonyState::Done);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_requires_completed_ceremony() {
        assert!(!CeremonyState::AwaitingCeremony.can_advance_to(&CeremonyState::AwaitingVerification));
        assert!(!CeremonyState::OptionsReady.can_advance_to(&CeremonyState::AwaitingVerification));
        assert!(CeremonyState::CeremonyComplete.can_advance_to(&CeremonyState::AwaitingVerification));
    }

    #[test]
    fn terminal_states_do_not_move() {
        let aborted = CeremonyState::Aborted("x".into());
        assert!(!CeremonyState::Done.can_advance_to(&aborted));
        assert!(!aborted.can_advance_to(&CeremonyState::Idle));
        assert!(CeremonyState::AwaitingOptions.can_advance_to(&aborted));
    }

    #[test]
    fn server_timeout_is_clamped() {
        let default = Duration::from_secs(120);
        assert_eq!(platform_time_limit(None, default), default);
        assert_eq!(
            platform_time_limit(Some(Duration::ZERO), default),
            MIN_CEREMONY_TIMEOUT
        );
        assert_eq!(
            platform_time_limit(Some(Duration::from_secs(30)), default),
            Duration::from_secs(30)
        );
        assert_eq!(
            platform_time_limit(Some(Duration::from_secs(600)), default),
            default
        );
        // A configured limit below the floor still lets the server ask for the floor
        assert_eq!(
            platform_time_limit(Some(Duration::ZERO), Duration::from_millis(50)),
            MIN_CEREMONY_TIMEOUT
        );
    }

    #[test]
    fn abort_records_user_message() {
        let mut context = CeremonyContext::new("registration", "alice");
        context.advance(CeremonyState::AwaitingOptions);
        context.abort(&CeremonyError::ServerVerdict("username taken".into()));
        assert_eq!(
            context.state(),
            &CeremonyState::Aborted("username taken".into())
        );
        assert_eq!(context.history().len(), 3);
    }
}
