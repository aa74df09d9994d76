//! Asymmetric (ed25519) webhook signatures.
//!
//! Senders keep the private key and publish the public key, so receivers can
//! verify deliveries without holding anything that could forge them. Tokens
//! use the `v1a` version and the same signed content as the HMAC scheme.

use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH,
};
use tracing::{debug, trace};

use crate::config::{
    ASYMMETRIC_SIGNATURE_VERSION, DEFAULT_TOLERANCE, PRIVATE_KEY_PREFIX, PUBLIC_KEY_PREFIX,
};
use crate::delivery::Delivery;
use crate::error::{VerificationError, WebhookError};
use crate::headers::{HeaderLookup, WebhookHeaders};
use crate::signature::{format_versioned_token, signed_content};

/// Signs and verifies `v1a` deliveries with an ed25519 key pair.
///
/// A verifier built from the public key alone can verify but not sign.
#[derive(Clone)]
pub struct AsymmetricWebhook {
    signing_key: Option<SigningKey>,
    verifying_key: VerifyingKey,
    tolerance: Duration,
}

impl fmt::Debug for AsymmetricWebhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricWebhook")
            .field("public_key", &self.public_key())
            .field("can_sign", &self.can_sign())
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl AsymmetricWebhook {
    /// Create a webhook from base64 keys, optionally prefixed with `whpk_`
    /// and `whsk_`. The public key is derived when only the private key is
    /// given.
    ///
    /// # Errors
    ///
    /// [`WebhookError::MissingKeys`] when both are `None`, and
    /// [`WebhookError::KeyMismatch`] when both are given but do not form a
    /// pair.
    pub fn new(public_key: Option<&str>, private_key: Option<&str>) -> Result<Self, WebhookError> {
        let signing_key = private_key.map(decode_private_key).transpose()?;
        let verifying_key = match (public_key, &signing_key) {
            (Some(encoded), signing_key) => {
                let verifying_key = decode_public_key(encoded)?;
                if signing_key.as_ref().is_some_and(|key| key.verifying_key() != verifying_key) {
                    return Err(WebhookError::KeyMismatch);
                }
                verifying_key
            }
            (None, Some(signing_key)) => signing_key.verifying_key(),
            (None, None) => return Err(WebhookError::MissingKeys),
        };

        debug!(
            can_sign = signing_key.is_some(),
            tolerance_seconds = DEFAULT_TOLERANCE.as_secs(),
            "asymmetric_webhook_created"
        );

        Ok(AsymmetricWebhook {
            signing_key,
            verifying_key,
            tolerance: DEFAULT_TOLERANCE,
        })
    }

    /// Create a signer (and verifier) from a base64 private key seed.
    pub fn from_private_key(private_key: &str) -> Result<Self, WebhookError> {
        Self::new(None, Some(private_key))
    }

    /// Create a verify-only webhook from a base64 public key.
    pub fn from_public_key(public_key: &str) -> Result<Self, WebhookError> {
        Self::new(Some(public_key), None)
    }

    /// Override the accepted clock skew (default five minutes).
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Whether a private key is available for signing.
    pub fn can_sign(&self) -> bool {
        self.signing_key.is_some()
    }

    /// The public key as `whpk_<base64>`, ready to hand to receivers.
    pub fn public_key(&self) -> String {
        format!(
            "{PUBLIC_KEY_PREFIX}{}",
            STANDARD.encode(self.verifying_key.as_bytes())
        )
    }

    /// Sign a delivery. The timestamp is normalized to UTC and floored to
    /// whole seconds.
    ///
    /// # Errors
    ///
    /// [`WebhookError::MissingPrivateKey`] for a verify-only webhook.
    pub fn sign<Tz: TimeZone>(
        &self,
        msg_id: &str,
        timestamp: &DateTime<Tz>,
        payload: &str,
    ) -> Result<String, WebhookError> {
        self.sign_unix(msg_id, timestamp.timestamp(), payload)
    }

    /// Sign a delivery whose timestamp is given in Unix epoch seconds.
    pub fn sign_unix(&self, msg_id: &str, timestamp: i64, payload: &str) -> Result<String, WebhookError> {
        let signing_key = self
            .signing_key
            .as_ref()
            .ok_or(WebhookError::MissingPrivateKey)?;

        let content = signed_content(msg_id, timestamp, payload);
        let signature = signing_key.sign(content.as_bytes());
        Ok(format_versioned_token(
            ASYMMETRIC_SIGNATURE_VERSION,
            &signature.to_bytes(),
        ))
    }

    /// Build the headers of an outgoing delivery.
    pub fn sign_headers<Tz: TimeZone>(
        &self,
        msg_id: &str,
        timestamp: &DateTime<Tz>,
        payload: &str,
    ) -> Result<WebhookHeaders, WebhookError> {
        Ok(WebhookHeaders {
            id: msg_id.to_string(),
            timestamp: timestamp.timestamp().to_string(),
            signature: self.sign(msg_id, timestamp, payload)?,
        })
    }

    /// Verify a received delivery against the current wall clock.
    ///
    /// Only `v1a` tokens are considered; the first valid one wins.
    pub fn verify<'p, P, H>(&self, payload: &'p P, headers: &H) -> Result<&'p str, VerificationError>
    where
        P: AsRef<[u8]> + ?Sized,
        H: HeaderLookup + ?Sized,
    {
        self.verify_at(payload, headers, &Utc::now())
    }

    /// Verify a received delivery against the clock reading `now`.
    pub fn verify_at<'p, P, H, Tz>(
        &self,
        payload: &'p P,
        headers: &H,
        now: &DateTime<Tz>,
    ) -> Result<&'p str, VerificationError>
    where
        P: AsRef<[u8]> + ?Sized,
        H: HeaderLookup + ?Sized,
        Tz: TimeZone,
    {
        self.verify_inner(payload.as_ref(), headers, Some(now.timestamp()))
    }

    /// Verify signatures without enforcing the tolerance window.
    pub fn verify_ignoring_timestamp<'p, P, H>(
        &self,
        payload: &'p P,
        headers: &H,
    ) -> Result<&'p str, VerificationError>
    where
        P: AsRef<[u8]> + ?Sized,
        H: HeaderLookup + ?Sized,
    {
        self.verify_inner(payload.as_ref(), headers, None)
    }

    fn verify_inner<'p, H>(
        &self,
        payload: &'p [u8],
        headers: &H,
        now: Option<i64>,
    ) -> Result<&'p str, VerificationError>
    where
        H: HeaderLookup + ?Sized,
    {
        let delivery = Delivery::read(payload, headers, now, self.tolerance)?;
        let content = delivery.signed_content();

        for token in delivery.tokens() {
            if !token.has_version(ASYMMETRIC_SIGNATURE_VERSION) {
                trace!(version = token.version, "webhook_signature_version_skipped");
                continue;
            }

            let Some(signature) = token
                .decode()
                .and_then(|bytes| Signature::from_slice(&bytes).ok())
            else {
                trace!("webhook_signature_malformed_skipped");
                continue;
            };

            if self
                .verifying_key
                .verify(content.as_bytes(), &signature)
                .is_ok()
            {
                return Ok(delivery.payload);
            }
        }

        Err(VerificationError::NoMatchingSignature)
    }
}

fn decode_private_key(encoded: &str) -> Result<SigningKey, WebhookError> {
    let seed = decode_key::<SECRET_KEY_LENGTH>(encoded, PRIVATE_KEY_PREFIX)?;
    Ok(SigningKey::from_bytes(&seed))
}

fn decode_public_key(encoded: &str) -> Result<VerifyingKey, WebhookError> {
    let bytes = decode_key::<PUBLIC_KEY_LENGTH>(encoded, PUBLIC_KEY_PREFIX)?;
    Ok(VerifyingKey::from_bytes(&bytes)?)
}

/// Strip `prefix` and base64-decode a key of exactly `N` bytes.
fn decode_key<const N: usize>(encoded: &str, prefix: &str) -> Result<[u8; N], WebhookError> {
    let encoded = encoded.strip_prefix(prefix).unwrap_or(encoded);
    let bytes = STANDARD.decode(encoded)?;

    let actual = bytes.len();
    bytes.try_into().map_err(|_| WebhookError::InvalidKeySize {
        expected: N,
        actual,
    })
}
