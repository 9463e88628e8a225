//! Software platform authenticator
//!
//! ES256 keys held in memory for the life of the process, "none" attestation.
//! It lets the terminal client run complete ceremonies without a browser or
//! a security key; nothing is written to disk.
//!
//! The UV flag is only set when the [`UserPresence`] hook verifies the user;
//! a plain yes/no prompt proves presence and nothing more.

use super::{PlatformAuthenticator, PlatformRejection};
use crate::encoding::to_base64url;
use crate::webauthn::types::{
    AssertionCredential, AssertionResponse, AttestationResponse,
    PublicKeyCredentialCreationOptions, PublicKeyCredentialRequestOptions,
    RegistrationCredential, PUBLIC_KEY,
};
use async_trait::async_trait;
use ciborium::Value as CborValue;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

/// COSE algorithm identifier for ECDSA P-256 with SHA-256
pub const ES256: i64 = -7;

const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;
const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;

const CREDENTIAL_ID_LEN: usize = 16;

/// What the authenticator is about to do, shown when asking for presence
#[derive(Debug, Clone)]
pub struct PresenceRequest {
    pub operation: &'static str,
    pub rp_id: String,
    pub user_name: Option<String>,
}

/// The "touch your key" step
#[async_trait]
pub trait UserPresence: Send + Sync {
    /// `true` when the user approves, `false` when they decline
    async fn confirm(&self, request: &PresenceRequest) -> bool;

    /// Whether `confirm` also establishes who the user is (PIN, biometrics)
    ///
    /// Only then may the authenticator set the UV flag.
    fn verifies_user(&self) -> bool {
        false
    }
}

/// Answers every presence check the same way without asking anyone
#[derive(Debug, Clone, Copy)]
pub struct AutoPresence(pub bool);

#[async_trait]
impl UserPresence for AutoPresence {
    async fn confirm(&self, request: &PresenceRequest) -> bool {
        tracing::debug!(
            operation = request.operation,
            rp_id = %request.rp_id,
            approved = self.0,
            "automatic presence decision"
        );
        self.0
    }
}

struct StoredCredential {
    id: Vec<u8>,
    rp_id: String,
    user_handle: Vec<u8>,
    user_name: String,
    key: SigningKey,
    sign_count: u32,
}

/// clientDataJSON, member order as browsers emit it
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientData<'a> {
    #[serde(rename = "type")]
    type_: &'a str,
    challenge: String,
    origin: &'a str,
    cross_origin: bool,
}

pub struct SoftwareAuthenticator {
    origin: Url,
    aaguid: [u8; 16],
    presence: Arc<dyn UserPresence>,
    credentials: Mutex<Vec<StoredCredential>>,
}

impl SoftwareAuthenticator {
    pub fn new(origin: Url, presence: Arc<dyn UserPresence>) -> Self {
        Self {
            origin,
            aaguid: [0u8; 16],
            presence,
            credentials: Mutex::new(Vec::new()),
        }
    }

    /// Number of credentials currently held
    pub fn credential_count(&self) -> usize {
        self.credentials.lock().len()
    }

    /// Resolve the RP id the way a browser does: explicit id, or the origin's host
    fn effective_rp_id(&self, requested: Option<&str>) -> Result<String, PlatformRejection> {
        let host = self.origin.host_str().unwrap_or_default();
        let rp_id = match requested {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => host.to_string(),
        };
        if host == rp_id || host.ends_with(&format!(".{}", rp_id)) {
            Ok(rp_id)
        } else {
            Err(PlatformRejection::NotAllowed(format!(
                "relying party id '{}' is not valid for origin {}",
                rp_id,
                self.origin.origin().ascii_serialization()
            )))
        }
    }

    fn client_data(&self, type_: &str, challenge: &[u8]) -> Vec<u8> {
        let origin = self.origin.origin().ascii_serialization();
        let client_data = ClientData {
            type_,
            challenge: to_base64url(challenge),
            origin: &origin,
            cross_origin: false,
        };
        // A struct of strings and a bool always serializes
        serde_json::to_vec(&client_data).unwrap_or_default()
    }

    /// UV flag for a request; a hard requirement we cannot meet is refused
    fn verification_flag(&self, requirement: Option<&str>) -> Result<u8, PlatformRejection> {
        let verifies = self.presence.verifies_user();
        match requirement {
            Some("required") if !verifies => Err(PlatformRejection::NotSupported(
                "user verification is required but this authenticator only checks presence"
                    .to_string(),
            )),
            Some("discouraged") => Ok(0),
            _ if verifies => Ok(FLAG_USER_VERIFIED),
            _ => Ok(0),
        }
    }

    async fn require_presence(&self, request: PresenceRequest) -> Result<(), PlatformRejection> {
        if self.presence.confirm(&request).await {
            Ok(())
        } else {
            Err(PlatformRejection::NotAllowed("user cancelled".to_string()))
        }
    }
}

/// COSE_Key for an ES256 public key (kty EC2, crv P-256)
fn cose_public_key(key: &SigningKey) -> Result<Vec<u8>, PlatformRejection> {
    let point = key.verifying_key().to_encoded_point(false);
    let (Some(x), Some(y)) = (point.x(), point.y()) else {
        return Err(PlatformRejection::NotSupported(
            "public key has no affine coordinates".to_string(),
        ));
    };
    let cose = CborValue::Map(vec![
        (CborValue::Integer(1.into()), CborValue::Integer(2.into())),
        (CborValue::Integer(3.into()), CborValue::Integer(ES256.into())),
        (CborValue::Integer((-1).into()), CborValue::Integer(1.into())),
        (CborValue::Integer((-2).into()), CborValue::Bytes(x.to_vec())),
        (CborValue::Integer((-3).into()), CborValue::Bytes(y.to_vec())),
    ]);
    cbor_bytes(&cose)
}

fn cbor_bytes(value: &CborValue) -> Result<Vec<u8>, PlatformRejection> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer)
        .map_err(|e| PlatformRejection::NotSupported(format!("CBOR encoding failed: {}", e)))?;
    Ok(buffer)
}

#[async_trait]
impl PlatformAuthenticator for SoftwareAuthenticator {
    async fn create(
        &self,
        options: PublicKeyCredentialCreationOptions,
    ) -> Result<RegistrationCredential, PlatformRejection> {
        let rp_id = self.effective_rp_id(options.rp.id.as_deref())?;

        // An empty list means the client default, which includes ES256
        let es256_offered = options.pub_key_cred_params.is_empty()
            || options
                .pub_key_cred_params
                .iter()
                .any(|p| p.type_ == PUBLIC_KEY && p.alg == ES256);
        if !es256_offered {
            return Err(PlatformRejection::NotSupported(
                "only ES256 (-7) credentials can be created".to_string(),
            ));
        }

        let selection = options.authenticator_selection.clone().unwrap_or_default();
        if selection.authenticator_attachment.as_deref() == Some("cross-platform") {
            return Err(PlatformRejection::NotSupported(
                "no cross-platform authenticator is available".to_string(),
            ));
        }

        let verification = self.verification_flag(selection.user_verification.as_deref())?;

        let excluded = {
            let held = self.credentials.lock();
            options.exclude_credentials.iter().any(|descriptor| {
                held.iter()
                    .any(|c| c.rp_id == rp_id && c.id == descriptor.id)
            })
        };
        if excluded {
            return Err(PlatformRejection::InvalidState(
                "this authenticator is already registered for the account".to_string(),
            ));
        }

        self.require_presence(PresenceRequest {
            operation: "create a passkey",
            rp_id: rp_id.clone(),
            user_name: Some(options.user.name.clone()),
        })
        .await?;

        let key = SigningKey::random(&mut OsRng);
        let mut credential_id = vec![0u8; CREDENTIAL_ID_LEN];
        OsRng.fill_bytes(&mut credential_id);

        let client_data_json = self.client_data("webauthn.create", &options.challenge);

        let flags = FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL | verification;
        let mut auth_data = Vec::with_capacity(128);
        auth_data.extend_from_slice(&Sha256::digest(rp_id.as_bytes()));
        auth_data.push(flags);
        auth_data.extend_from_slice(&0u32.to_be_bytes());
        auth_data.extend_from_slice(&self.aaguid);
        auth_data.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&credential_id);
        auth_data.extend_from_slice(&cose_public_key(&key)?);

        let attestation_object = cbor_bytes(&CborValue::Map(vec![
            (CborValue::Text("fmt".into()), CborValue::Text("none".into())),
            (CborValue::Text("attStmt".into()), CborValue::Map(vec![])),
            (CborValue::Text("authData".into()), CborValue::Bytes(auth_data)),
        ]))?;

        {
            let mut held = self.credentials.lock();
            // Same account on the same RP: the new credential replaces the old one
            held.retain(|c| !(c.rp_id == rp_id && c.user_handle == options.user.id));
            held.push(StoredCredential {
                id: credential_id.clone(),
                rp_id: rp_id.clone(),
                user_handle: options.user.id.clone(),
                user_name: options.user.name.clone(),
                key,
                sign_count: 0,
            });
        }
        tracing::debug!(rp_id = %rp_id, user = %options.user.name, "software credential created");

        Ok(RegistrationCredential {
            id: to_base64url(&credential_id),
            raw_id: credential_id,
            type_: PUBLIC_KEY.to_string(),
            extensions: json!({}),
            response: AttestationResponse {
                attestation_object,
                client_data_json,
                transports: vec!["internal".to_string()],
            },
        })
    }

    async fn get(
        &self,
        options: PublicKeyCredentialRequestOptions,
    ) -> Result<AssertionCredential, PlatformRejection> {
        let rp_id = self.effective_rp_id(options.rp_id.as_deref())?;
        let verification = self.verification_flag(options.user_verification.as_deref())?;

        let (credential_id, user_name) = {
            let held = self.credentials.lock();
            held.iter()
                .rev()
                .find(|c| {
                    c.rp_id == rp_id
                        && (options.allow_credentials.is_empty()
                            || options.allow_credentials.iter().any(|d| d.id == c.id))
                })
                .map(|c| (c.id.clone(), c.user_name.clone()))
                .ok_or(PlatformRejection::NoMatchingCredential)?
        };

        self.require_presence(PresenceRequest {
            operation: "sign in with a passkey",
            rp_id: rp_id.clone(),
            user_name: Some(user_name),
        })
        .await?;

        let (key, sign_count, user_handle) = {
            let mut held = self.credentials.lock();
            let stored = held
                .iter_mut()
                .find(|c| c.id == credential_id)
                .ok_or(PlatformRejection::NoMatchingCredential)?;
            stored.sign_count = stored.sign_count.wrapping_add(1);
            (stored.key.clone(), stored.sign_count, stored.user_handle.clone())
        };

        let client_data_json = self.client_data("webauthn.get", &options.challenge);

        let mut authenticator_data = Vec::with_capacity(37);
        authenticator_data.extend_from_slice(&Sha256::digest(rp_id.as_bytes()));
        authenticator_data.push(FLAG_USER_PRESENT | verification);
        authenticator_data.extend_from_slice(&sign_count.to_be_bytes());

        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&Sha256::digest(&client_data_json));
        let signature: Signature = key.sign(&signed);

        Ok(AssertionCredential {
            id: to_base64url(&credential_id),
            raw_id: credential_id,
            type_: PUBLIC_KEY.to_string(),
            extensions: json!({}),
            response: AssertionResponse {
                authenticator_data,
                client_data_json,
                signature: signature.to_der().as_bytes().to_vec(),
                user_handle: Some(user_handle),
            },
        })
    }
}
