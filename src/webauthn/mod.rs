//! # WebAuthn Module
//!
//! The two ceremonies, expressed as strategies for the generic flow in
//! [`crate::ceremony`].
//!
//! ## Submodules
//! - `types`: request/response shapes for the relying party and the platform
//! - `registration`: creating a new passkey (`/api/makeCredentialOptions`, `/api/makeCredential`)
//! - `authentication`: signing in with an existing passkey (`/api/assertionOptions`, `/api/makeAssertion`)
//!
//! ## WebAuthn Flow Overview
//!
//! ### Registration (Creating a Passkey)
//! 1. Client posts the username and policy knobs → server returns creation options
//! 2. Client decodes challenge, user id and excluded credential ids to bytes
//! 3. Platform authenticator creates the credential
//! 4. Client base64url-encodes the attestation and posts it → server verifies
//!
//! ### Authentication (Logging In)
//! 1. Client posts the username → server returns request options
//! 2. Client decodes challenge and allowed credential ids to bytes
//! 3. Platform authenticator signs the challenge
//! 4. Client base64url-encodes the assertion and posts it → server verifies

pub mod authentication;
pub mod registration;
pub mod types;

use crate::encoding::to_binary;
use crate::error::{CeremonyResult, TransportError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use types::{CredentialDescriptor, DescriptorDocument};

/// Decode every credential id of an exclude/allow list
///
/// Errors name the list and the index, e.g. `allowCredentials[2].id`.
fn decode_descriptors(
    documents: Option<Vec<DescriptorDocument>>,
    list: &str,
) -> CeremonyResult<Vec<CredentialDescriptor>> {
    documents
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, document)| {
            Ok(CredentialDescriptor {
                id: to_binary(&document.id, &format!("{}[{}].id", list, index))?,
                type_: document.type_,
                transports: document.transports,
            })
        })
        .collect()
}

/// Parse an option document; a shape mismatch counts as malformed JSON
fn parse_document<T: DeserializeOwned>(path: &str, document: Value) -> CeremonyResult<T> {
    serde_json::from_value(document).map_err(|e| {
        TransportError::MalformedJson {
            path: path.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
