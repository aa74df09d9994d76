//! Signature primitives.
//!
//! Standard Webhooks signs `"{msg_id}.{timestamp}.{payload}"` with
//! HMAC-SHA256 (`v1,<base64>`) or ed25519 (`v1a,<base64>`). A signature
//! header may carry several such tokens separated by single spaces.
//! Reference: https://github.com/standard-webhooks/standard-webhooks/blob/main/spec/standard-webhooks.md

use base64::{engine::general_purpose::STANDARD, Engine};
use subtle::ConstantTimeEq;

use crate::config::SIGNATURE_VERSION;
use crate::error::VerificationError;

/// Build the canonical content covered by the signature.
pub fn signed_content(msg_id: &str, timestamp: i64, payload: &str) -> String {
    format!("{msg_id}.{timestamp}.{payload}")
}

/// Format a raw MAC as a versioned token, e.g. `v1,g0hM9S...=`.
pub fn format_token(mac: &[u8]) -> String {
    format_versioned_token(SIGNATURE_VERSION, mac)
}

/// Format raw signature bytes as `{version},<base64>`.
pub fn format_versioned_token(version: &str, signature: &[u8]) -> String {
    format!("{},{}", version, STANDARD.encode(signature))
}

/// One `version,signature` entry of a signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureToken<'a> {
    pub version: &'a str,
    pub signature: &'a str,
}

impl<'a> SignatureToken<'a> {
    /// Split a token at its first comma. Tokens without a comma yield `None`.
    pub fn parse(token: &'a str) -> Option<Self> {
        let (version, signature) = token.split_once(',')?;
        Some(SignatureToken { version, signature })
    }

    /// Whether this token uses the version this crate verifies.
    pub fn is_supported(&self) -> bool {
        self.has_version(SIGNATURE_VERSION)
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.version == version
    }

    /// Base64-decode the signature, `None` if it is malformed.
    pub fn decode(&self) -> Option<Vec<u8>> {
        STANDARD.decode(self.signature).ok()
    }
}

/// Iterate over the well-formed tokens of a `webhook-signature` header.
pub fn parse_signature_header(header: &str) -> impl Iterator<Item = SignatureToken<'_>> {
    header.split(' ').filter_map(SignatureToken::parse)
}

/// Parse a `webhook-timestamp` value into Unix epoch seconds.
///
/// Integers are taken as-is; a finite fractional value is floored.
pub fn parse_timestamp(raw: &str) -> Result<i64, VerificationError> {
    if let Ok(seconds) = raw.parse::<i64>() {
        return Ok(seconds);
    }

    match raw.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds.abs() < i64::MAX as f64 => {
            Ok(seconds.floor() as i64)
        }
        _ => Err(VerificationError::InvalidTimestamp),
    }
}

/// Constant-time comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
