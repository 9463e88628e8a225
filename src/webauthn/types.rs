//! # WebAuthn Wire Types
//!
//! Shapes exchanged with the relying party and with the platform authenticator.
//!
//! ## Three Layers
//! - **Forms**: the option requests are sent as `application/x-www-form-urlencoded`
//! - **Documents**: option JSON as received; binary members are still raw
//!   `serde_json::Value`s so decoding errors can name the offending field
//! - **Decoded / encoded**: options with real bytes (handed to the platform),
//!   and credential results with base64url strings (sent back to the server)

use crate::encoding::base64url;
use crate::error::{CeremonyError, CeremonyResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Credential type for every WebAuthn credential in existence so far
pub const PUBLIC_KEY: &str = "public-key";

// Option request bodies

/// Body of `POST /api/makeCredentialOptions`
#[derive(Debug, Clone, Serialize)]
pub struct CredentialOptionsForm {
    pub username: String,
    /// Attestation conveyance preference (`none`, `indirect`, `direct`)
    #[serde(rename = "attType")]
    pub att_type: String,
    /// Authenticator attachment (`platform`, `cross-platform`, empty for no preference)
    #[serde(rename = "authType")]
    pub auth_type: String,
    #[serde(rename = "userVerification")]
    pub user_verification: String,
    #[serde(rename = "residentKey")]
    pub resident_key: String,
}

/// Body of `POST /api/assertionOptions`
#[derive(Debug, Clone, Serialize)]
pub struct AssertionOptionsForm {
    pub username: String,
    #[serde(rename = "userVerification")]
    pub user_verification: String,
}

// Shared entities

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialParameters {
    #[serde(rename = "type")]
    pub type_: String,
    pub alg: i64,
}

/// Policy knobs of a registration; passed through untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    /// `None` means "no preference": the member is left out rather than sent as null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resident_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_resident_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<String>,
}

// Option documents (as received)

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DescriptorDocument {
    #[serde(rename = "type", default = "public_key_type")]
    pub type_: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub transports: Option<Vec<String>>,
}

/// Registration options exactly as the relying party sent them
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptionsDocument {
    #[serde(default)]
    pub rp: RelyingPartyEntity,
    #[serde(default)]
    pub user: UserDocument,
    #[serde(default)]
    pub challenge: Value,
    #[serde(default)]
    pub pub_key_cred_params: Vec<CredentialParameters>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub attestation: Option<String>,
    #[serde(default)]
    pub authenticator_selection: Option<AuthenticatorSelection>,
    #[serde(default)]
    pub exclude_credentials: Option<Vec<DescriptorDocument>>,
    #[serde(default)]
    pub extensions: Option<Value>,
}

/// Authentication options exactly as the relying party sent them
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptionsDocument {
    #[serde(default)]
    pub challenge: Value,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub rp_id: Option<String>,
    #[serde(default)]
    pub allow_credentials: Option<Vec<DescriptorDocument>>,
    #[serde(default)]
    pub user_verification: Option<String>,
    #[serde(default)]
    pub extensions: Option<Value>,
}

fn public_key_type() -> String {
    PUBLIC_KEY.to_string()
}

// Decoded options (handed to the platform)

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

/// Input of [`PlatformAuthenticator::create`](crate::platform::PlatformAuthenticator::create)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    pub pub_key_cred_params: Vec<CredentialParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_selection: Option<AuthenticatorSelection>,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// Input of [`PlatformAuthenticator::get`](crate::platform::PlatformAuthenticator::get)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    pub allow_credentials: Vec<CredentialDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

// Platform results (raw bytes)

#[derive(Debug, Clone)]
pub struct AttestationResponse {
    pub attestation_object: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub transports: Vec<String>,
}

/// What `create` hands back
#[derive(Debug, Clone)]
pub struct RegistrationCredential {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub type_: String,
    pub extensions: Value,
    pub response: AttestationResponse,
}

#[derive(Debug, Clone)]
pub struct AssertionResponse {
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

/// What `get` hands back
#[derive(Debug, Clone)]
pub struct AssertionCredential {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub type_: String,
    pub extensions: Value,
    pub response: AssertionResponse,
}

// Encoded results (sent to the server)

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedAttestationResponse {
    pub attestation_object: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub transports: Vec<String>,
}

/// Body of `POST /api/makeCredential`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedRegistrationCredential {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub extensions: Value,
    pub response: EncodedAttestationResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedAssertionResponse {
    pub authenticator_data: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// Body of `POST /api/makeAssertion`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedAssertionCredential {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub extensions: Value,
    pub response: EncodedAssertionResponse,
}

// Server verdict

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Ok,
    Error,
}

/// Answer of the two verification endpoints
///
/// ## Example JSON
/// ```json
/// { "status": "error", "errorMessage": "Signature mismatch" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerVerdict {
    pub status: VerdictStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ServerVerdict {
    pub fn into_result(self) -> CeremonyResult<()> {
        match self.status {
            VerdictStatus::Ok => Ok(()),
            VerdictStatus::Error => Err(CeremonyError::ServerVerdict(error_text(
                self.error_message.as_deref(),
            ))),
        }
    }
}

/// Stop before decoding when an option document carries `status: "error"`
///
/// Option documents only carry `status` when something went wrong, so a
/// missing status means "go ahead".
pub fn reject_error_status(document: &Value) -> CeremonyResult<()> {
    if document.get("status").and_then(Value::as_str) == Some("error") {
        let message = document.get("errorMessage").and_then(Value::as_str);
        return Err(CeremonyError::ServerVerdict(error_text(message)));
    }
    Ok(())
}

fn error_text(message: Option<&str>) -> String {
    match message {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => "The server reported an error without a message".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn error_status_stops_decoding() {
        let doc = json!({"status": "error", "errorMessage": "username taken"});
        let err = reject_error_status(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerVerdict);
        assert_eq!(err.user_message(), "username taken");
    }

    #[test]
    fn ok_or_missing_status_passes() {
        assert!(reject_error_status(&json!({"status": "ok", "challenge": "AA"})).is_ok());
        assert!(reject_error_status(&json!({"challenge": "AA"})).is_ok());
    }

    #[test]
    fn verdict_without_message_still_explains_itself() {
        let verdict: ServerVerdict = serde_json::from_value(json!({"status": "error"})).unwrap();
        let err = verdict.into_result().unwrap_err();
        assert!(!err.user_message().is_empty());
    }

    #[test]
    fn form_uses_server_field_names() {
        let form = CredentialOptionsForm {
            username: "alice".into(),
            att_type: "none".into(),
            auth_type: String::new(),
            user_verification: "preferred".into(),
            resident_key: "discouraged".into(),
        };
        let value = serde_json::to_value(&form).unwrap();
        assert_eq!(value["attType"], "none");
        assert_eq!(value["authType"], "");
        assert_eq!(value["residentKey"], "discouraged");
    }
}
