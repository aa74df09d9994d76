//! Error types.

use std::str::Utf8Error;

use thiserror::Error;

/// Reason a delivery (or a secret) was rejected.
///
/// Every user-facing failure of [`Webhook::verify`](crate::Webhook::verify)
/// is one of these variants. None of them are transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// The secret was empty, before or after decoding.
    #[error("secret can't be empty")]
    EmptySecret,

    /// `webhook-id` was absent or empty.
    #[error("missing webhook-id header")]
    MissingId,

    /// `webhook-signature` was absent or empty.
    #[error("missing webhook-signature header")]
    MissingSignature,

    /// `webhook-timestamp` was absent or empty.
    #[error("missing webhook-timestamp header")]
    MissingTimestamp,

    /// `webhook-timestamp` is not a number.
    #[error("invalid signature headers")]
    InvalidTimestamp,

    #[error("message timestamp too old")]
    TimestampTooOld,

    #[error("message timestamp too new")]
    TimestampTooNew,

    /// The payload bytes are not UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidPayload,

    /// No token of the verifier's version matched the expected signature.
    #[error("no matching signature found")]
    NoMatchingSignature,
}

/// Errors raised while constructing a [`Webhook`](crate::Webhook).
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// The secret is not valid base64.
    #[error("invalid secret: {0}")]
    InvalidSecret(#[from] base64::DecodeError),

    /// The secret bytes are not UTF-8 text.
    #[error("secret is not valid UTF-8: {0}")]
    SecretEncoding(#[from] Utf8Error),

    #[error("invalid key length: {0}")]
    InvalidKeyLength(#[from] hmac::digest::InvalidLength),

    /// Neither a public nor a private ed25519 key was given.
    #[error("no public or private key provided")]
    MissingKeys,

    /// Signing needs the private half of the key pair.
    #[error("signing requires a private key")]
    MissingPrivateKey,

    /// A decoded ed25519 key has the wrong number of bytes.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    /// The public key bytes are not a valid curve point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(#[from] ed25519_dalek::SignatureError),

    /// The given public key does not belong to the given private key.
    #[error("public key does not match private key")]
    KeyMismatch,
}

/// Errors raised while loading [`Config`](crate::Config) from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed, and has no safe default.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}
