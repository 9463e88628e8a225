//! # Binary Coercion
//!
//! Conversions between base64url text and raw bytes.
//!
//! The relying party sends every binary field (challenge, user handle,
//! credential ids) as base64url text, while the authenticator wants raw bytes.
//! The way back is symmetric: raw bytes from the authenticator are turned into
//! unpadded base64url before they go into JSON.
//!
//! A single wrong byte here invalidates the signature check on the server, so
//! `to_binary(to_base64url(b)) == b` must hold for every byte string.

use crate::error::{CeremonyError, CeremonyResult};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::prelude::*;
use serde_json::Value;

/// Standard alphabet, padding optional. base64url input is mapped onto the
/// standard alphabet before decoding, so both spellings are accepted.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Anything that can stand for a byte string
#[derive(Debug, Clone, Copy)]
pub enum BinaryInput<'a> {
    /// base64url (or base64) text
    Text(&'a str),
    /// A JSON array of integers, each in `0..=255`
    Numeric(&'a [Value]),
    /// Already raw bytes
    Buffer(&'a [u8]),
    /// A value of some other shape; carries its JSON type name
    Unrecognized(&'static str),
}

impl<'a> From<&'a Value> for BinaryInput<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::String(s) => BinaryInput::Text(s),
            Value::Array(items) => BinaryInput::Numeric(items),
            Value::Null => BinaryInput::Unrecognized("null"),
            Value::Bool(_) => BinaryInput::Unrecognized("boolean"),
            Value::Number(_) => BinaryInput::Unrecognized("number"),
            Value::Object(_) => BinaryInput::Unrecognized("object"),
        }
    }
}

impl<'a> From<&'a str> for BinaryInput<'a> {
    fn from(text: &'a str) -> Self {
        BinaryInput::Text(text)
    }
}

impl<'a> From<&'a [u8]> for BinaryInput<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        BinaryInput::Buffer(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for BinaryInput<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        BinaryInput::Buffer(bytes.as_slice())
    }
}

/// Coerce `input` into raw bytes
///
/// `field` names the value being decoded and is carried by every error, so a
/// bad server response points straight at the offending member.
pub fn to_binary<'a>(input: impl Into<BinaryInput<'a>>, field: &str) -> CeremonyResult<Vec<u8>> {
    match input.into() {
        BinaryInput::Text(text) => {
            let standard: String = text
                .chars()
                .map(|c| match c {
                    '-' => '+',
                    '_' => '/',
                    other => other,
                })
                .collect();
            LENIENT_STANDARD
                .decode(standard.as_bytes())
                .map_err(|e| CeremonyError::encoding(field, e.to_string()))
        }
        BinaryInput::Numeric(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| {
                        CeremonyError::encoding(
                            field,
                            format!("element {} ({}) is not a byte", index, item),
                        )
                    })
            })
            .collect(),
        BinaryInput::Buffer(bytes) => Ok(bytes.to_vec()),
        BinaryInput::Unrecognized(kind) => Err(CeremonyError::encoding(
            field,
            format!("expected base64url text or a byte array, got {}", kind),
        )),
    }
}

/// Encode bytes as unpadded base64url
pub fn to_base64url(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Serde adapter writing `Vec<u8>` fields as base64url strings
pub mod base64url {
    use super::to_base64url;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_base64url(bytes))
    }
}
