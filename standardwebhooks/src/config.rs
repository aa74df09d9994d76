//! Configuration module.
//!
//! Holds the fixed protocol constants used by the library and the
//! environment-driven [`Config`] used by the `webhook-sign` and
//! `webhook-verify` binaries.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::{ConfigError, VerificationError, WebhookError};
use crate::webhook::Webhook;

/// Signature scheme version understood by this crate.
pub const SIGNATURE_VERSION: &str = "v1";

/// Asymmetric (ed25519) signature scheme version.
pub const ASYMMETRIC_SIGNATURE_VERSION: &str = "v1a";

/// Optional prefix carried by encoded secrets.
pub const SECRET_PREFIX: &str = "whsec_";

/// Optional prefix carried by encoded ed25519 public keys.
pub const PUBLIC_KEY_PREFIX: &str = "whpk_";

/// Optional prefix carried by encoded ed25519 private keys.
pub const PRIVATE_KEY_PREFIX: &str = "whsk_";

/// Header carrying the unique message identifier.
pub const HEADER_WEBHOOK_ID: &str = "webhook-id";

/// Header carrying the space separated signature tokens.
pub const HEADER_WEBHOOK_SIGNATURE: &str = "webhook-signature";

/// Header carrying the Unix epoch seconds of the delivery.
pub const HEADER_WEBHOOK_TIMESTAMP: &str = "webhook-timestamp";

/// Default accepted clock skew around "now".
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Binary configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Encoded secrets, the first one signs (`WEBHOOK_SECRET`, comma separated)
    pub secrets: Vec<String>,

    /// Accepted clock skew in seconds
    pub tolerance_seconds: u64,

    /// Whether `webhook-verify` enforces the tolerance window
    pub enforce_timestamp: bool,

    /// Message identifier used by `webhook-sign`
    pub message_id: Option<String>,

    /// Unix epoch seconds used by `webhook-sign` (defaults to now)
    pub timestamp: Option<i64>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("secrets", &format_args!("[{} redacted]", self.secrets.len()))
            .field("tolerance_seconds", &self.tolerance_seconds)
            .field("enforce_timestamp", &self.enforce_timestamp)
            .field("message_id", &self.message_id)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// A set but unparseable `WEBHOOK_TIMESTAMP` is rejected instead of
    /// falling back to the current time.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            secrets: parse_csv("WEBHOOK_SECRET").unwrap_or_default(),

            tolerance_seconds: parse_number(
                "WEBHOOK_TOLERANCE_SECONDS",
                DEFAULT_TOLERANCE.as_secs(),
            ),

            enforce_timestamp: parse_bool("WEBHOOK_ENFORCE_TIMESTAMP", true),

            message_id: env::var("WEBHOOK_ID").ok().filter(|v| !v.is_empty()),

            timestamp: parse_required_number("WEBHOOK_TIMESTAMP")?,
        })
    }

    /// Build a [`Webhook`] from the configured secrets and tolerance.
    pub fn webhook(&self) -> Result<Webhook, WebhookError> {
        let (primary, rest) = self
            .secrets
            .split_first()
            .ok_or(VerificationError::EmptySecret)?;

        let mut webhook = Webhook::new(primary)?
            .with_tolerance(Duration::from_secs(self.tolerance_seconds));
        for secret in rest {
            webhook = webhook.with_secret(secret)?;
        }

        Ok(webhook)
    }
}

/// Parse a number, warning and falling back to `default` when malformed.
fn parse_number<T: FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid numeric value, using default");
            default
        }
    }
}

/// Parse an optional number that has no safe default when malformed.
fn parse_required_number<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    let raw = match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return Ok(None),
    };

    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue { name, value: raw })
}

/// Parse a boolean flag such as "true", "0" or "no".
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean value, using default");
            default
        }
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
