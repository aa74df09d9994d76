//! Standard Webhooks - HMAC-SHA256 and ed25519 webhook signing and verification.
//!
//! This library provides the signer/verifier used by the two binaries:
//! - `webhook-sign`: Signs a payload and prints the delivery headers
//! - `webhook-verify`: Verifies a received delivery and echoes its payload
//!
//! ## Signature scheme
//!
//! ```text
//! "{webhook-id}.{webhook-timestamp}.{payload}" → HMAC-SHA256(secret) → "v1,<base64>"
//! "{webhook-id}.{webhook-timestamp}.{payload}" → ed25519(private key) → "v1a,<base64>"
//! ```
//!
//! Transport, secret storage and payload parsing are left to the caller.

pub mod asymmetric;
pub mod config;
mod delivery;
pub mod error;
pub mod headers;
pub mod secret;
pub mod signature;
pub mod webhook;

// Re-export commonly used types
pub use asymmetric::AsymmetricWebhook;
pub use config::{
    Config, ASYMMETRIC_SIGNATURE_VERSION, DEFAULT_TOLERANCE, PRIVATE_KEY_PREFIX,
    PUBLIC_KEY_PREFIX, SECRET_PREFIX, SIGNATURE_VERSION,
};
pub use error::{ConfigError, VerificationError, WebhookError};
pub use headers::{HeaderLookup, WebhookHeaders};
pub use secret::SigningSecret;
pub use webhook::Webhook;
