//! Shared signing secrets.
//!
//! A [`SigningSecret`] is decoded once at construction and keeps a keyed
//! HMAC-SHA256 state that is cloned for every signature, so the key is
//! validated up front and never re-parsed.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::SECRET_PREFIX;
use crate::error::{VerificationError, WebhookError};

type HmacSha256 = Hmac<Sha256>;

/// A decoded shared secret ready to compute HMAC-SHA256 tags.
#[derive(Clone)]
pub struct SigningSecret {
    mac: HmacSha256,
}

impl SigningSecret {
    /// Decode a base64 secret, with or without the `whsec_` prefix.
    ///
    /// # Errors
    ///
    /// `EmptySecret` for an empty input or an input that decodes to no
    /// bytes, `InvalidSecret` when the remainder is not valid base64.
    pub fn from_base64(secret: &str) -> Result<Self, WebhookError> {
        if secret.is_empty() {
            return Err(VerificationError::EmptySecret.into());
        }

        let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
        let key = STANDARD.decode(encoded)?;

        Self::from_raw(&key)
    }

    /// Decode a base64 secret supplied as UTF-8 bytes.
    pub fn from_utf8(secret: &[u8]) -> Result<Self, WebhookError> {
        if secret.is_empty() {
            return Err(VerificationError::EmptySecret.into());
        }

        Self::from_base64(std::str::from_utf8(secret)?)
    }

    /// Use already decoded key bytes as-is.
    pub fn from_raw(key: &[u8]) -> Result<Self, WebhookError> {
        if key.is_empty() {
            return Err(VerificationError::EmptySecret.into());
        }

        let mac = HmacSha256::new_from_slice(key)?;
        Ok(SigningSecret { mac })
    }

    /// Compute HMAC-SHA256 over `content` with this secret.
    pub fn mac(&self, content: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(content);
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}
