//! # Passkey Registration
//!
//! Client side of credential creation.
//!
//! ## Registration Flow
//! 1. **Options**: post username and policy knobs to `/api/makeCredentialOptions`
//! 2. **Decode**: challenge, user id and every excluded credential id become bytes
//! 3. **Create**: the platform authenticator makes a new key pair
//! 4. **Submit**: attestation object and client data go to `/api/makeCredential`

use super::types::{
    reject_error_status, CreationOptionsDocument, CredentialOptionsForm,
    EncodedAttestationResponse, EncodedRegistrationCredential, PublicKeyCredentialCreationOptions,
    RegistrationCredential, UserEntity,
};
use super::{decode_descriptors, parse_document};
use crate::ceremony::Ceremony;
use crate::encoding::{to_base64url, to_binary};
use crate::error::CeremonyResult;
use crate::platform::{PlatformAuthenticator, PlatformRejection};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Registration ceremony, carrying the policy the user asked for
///
/// The knobs are opaque strings: the server interprets them, we only forward.
#[derive(Debug, Clone)]
pub struct Registration {
    /// `attType`: `none`, `indirect` or `direct`
    pub attestation: String,
    /// `authType`: `platform`, `cross-platform` or empty for no preference
    pub authenticator_attachment: String,
    pub user_verification: String,
    pub resident_key: String,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            attestation: "none".to_string(),
            authenticator_attachment: String::new(),
            user_verification: "preferred".to_string(),
            resident_key: "discouraged".to_string(),
        }
    }
}

/// Turn the server's creation options into what the platform accepts
///
/// - aborts with the server message on `status: "error"`, before touching anything else
/// - decodes `challenge`, `user.id` and `excludeCredentials[*].id`
/// - drops a null or empty `authenticatorAttachment` (the platform rejects null)
pub fn decode_creation_options(
    document: Value,
) -> CeremonyResult<PublicKeyCredentialCreationOptions> {
    reject_error_status(&document)?;
    let document: CreationOptionsDocument =
        parse_document(Registration::OPTIONS_PATH, document)?;

    let challenge = to_binary(&document.challenge, "challenge")?;
    let user_id = to_binary(&document.user.id, "user.id")?;
    let exclude_credentials =
        decode_descriptors(document.exclude_credentials, "excludeCredentials")?;

    let authenticator_selection = document.authenticator_selection.map(|mut selection| {
        if selection
            .authenticator_attachment
            .as_deref()
            .map_or(false, str::is_empty)
        {
            selection.authenticator_attachment = None;
        }
        selection
    });

    Ok(PublicKeyCredentialCreationOptions {
        rp: document.rp,
        user: UserEntity {
            id: user_id,
            name: document.user.name,
            display_name: document.user.display_name,
        },
        challenge,
        pub_key_cred_params: document.pub_key_cred_params,
        timeout: document.timeout,
        attestation: document.attestation,
        authenticator_selection,
        exclude_credentials,
        extensions: document.extensions,
    })
}

/// Base64url-encode every binary member of a new credential
pub fn encode_registration(credential: RegistrationCredential) -> EncodedRegistrationCredential {
    EncodedRegistrationCredential {
        id: credential.id,
        raw_id: to_base64url(&credential.raw_id),
        type_: credential.type_,
        extensions: credential.extensions,
        response: EncodedAttestationResponse {
            attestation_object: to_base64url(&credential.response.attestation_object),
            client_data_json: to_base64url(&credential.response.client_data_json),
            transports: credential.response.transports,
        },
    }
}

#[async_trait]
impl Ceremony for Registration {
    type Form = CredentialOptionsForm;
    type Options = PublicKeyCredentialCreationOptions;
    type Credential = RegistrationCredential;
    type Submission = EncodedRegistrationCredential;

    const NAME: &'static str = "registration";
    const OPTIONS_PATH: &'static str = "/api/makeCredentialOptions";
    const RESULT_PATH: &'static str = "/api/makeCredential";

    fn build_options(&self, username: &str) -> CredentialOptionsForm {
        CredentialOptionsForm {
            username: username.to_string(),
            att_type: self.attestation.clone(),
            auth_type: self.authenticator_attachment.clone(),
            user_verification: self.user_verification.clone(),
            resident_key: self.resident_key.clone(),
        }
    }

    fn decode_options(&self, document: Value) -> CeremonyResult<Self::Options> {
        decode_creation_options(document)
    }

    fn requested_timeout(&self, options: &Self::Options) -> Option<Duration> {
        options.timeout.map(Duration::from_millis)
    }

    async fn invoke_platform(
        &self,
        platform: &dyn PlatformAuthenticator,
        options: Self::Options,
    ) -> Result<Self::Credential, PlatformRejection> {
        platform.create(options).await
    }

    fn build_result(&self, credential: Self::Credential) -> Self::Submission {
        encode_registration(credential)
    }
}
