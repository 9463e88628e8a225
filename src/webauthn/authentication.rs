use super::types::{
    reject_error_status, AssertionCredential, AssertionOptionsForm, EncodedAssertionCredential,
    EncodedAssertionResponse, PublicKeyCredentialRequestOptions, RequestOptionsDocument,
};
use super::{decode_descriptors, parse_document};
use crate::ceremony::Ceremony;
use crate::encoding::{to_base64url, to_binary};
use crate::error::CeremonyResult;
use crate::platform::{PlatformAuthenticator, PlatformRejection};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Authentication ceremony (sign in with an existing passkey)
#[derive(Debug, Clone)]
pub struct Authentication {
    pub user_verification: String,
}

impl Default for Authentication {
    fn default() -> Self {
        Self {
            user_verification: "preferred".to_string(),
        }
    }
}

pub fn decode_request_options(document: Value) -> CeremonyResult<PublicKeyCredentialRequestOptions> {
    reject_error_status(&document)?;
    let document: RequestOptionsDocument =
        parse_document(Authentication::OPTIONS_PATH, document)?;

    Ok(PublicKeyCredentialRequestOptions {
        challenge: to_binary(&document.challenge, "challenge")?,
        allow_credentials: decode_descriptors(document.allow_credentials, "allowCredentials")?,
        timeout: document.timeout,
        rp_id: document.rp_id,
        user_verification: document.user_verification,
        extensions: document.extensions,
    })
}

pub fn encode_assertion(credential: AssertionCredential) -> EncodedAssertionCredential {
    let response = credential.response;
    EncodedAssertionCredential {
        id: credential.id,
        raw_id: to_base64url(&credential.raw_id),
        type_: credential.type_,
        extensions: credential.extensions,
        response: EncodedAssertionResponse {
            authenticator_data: to_base64url(&response.authenticator_data),
            client_data_json: to_base64url(&response.client_data_json),
            signature: to_base64url(&response.signature),
            user_handle: response.user_handle.as_deref().map(to_base64url),
        },
    }
}

#[async_trait]
impl Ceremony for Authentication {
    type Form = AssertionOptionsForm;
    type Options = PublicKeyCredentialRequestOptions;
    type Credential = AssertionCredential;
    type Submission = EncodedAssertionCredential;

    const NAME: &'static str = "authentication";
    const OPTIONS_PATH: &'static str = "/api/assertionOptions";
    const RESULT_PATH: &'static str = "/api/makeAssertion";

    fn build_options(&self, username: &str) -> AssertionOptionsForm {
        AssertionOptionsForm {
            username: username.to_string(),
            user_verification: self.user_verification.clone(),
        }
    }

    fn decode_options(&self, document: Value) -> CeremonyResult<Self::Options> {
        decode_request_options(document)
    }

    fn requested_timeout(&self, options: &Self::Options) -> Option<Duration> {
        options.timeout.map(Duration::from_millis)
    }

    async fn invoke_platform(
        &self,
        platform: &dyn PlatformAuthenticator,
        options: Self::Options,
    ) -> Result<Self::Credential, PlatformRejection> {
        platform.get(options).await
    }

    fn build_result(&self, credential: Self::Credential) -> Self::Submission {
        encode_assertion(credential)
    }
}
