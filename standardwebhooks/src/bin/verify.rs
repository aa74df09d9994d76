//! Webhook Verify - verifies a received delivery.
//!
//! Reads a JSON document `{"headers": {...}, "payload": "..."}` from stdin,
//! verifies it against the secrets in `WEBHOOK_SECRET`, and echoes the
//! payload on stdout. Exits non-zero when verification fails.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use standardwebhooks::config::HEADER_WEBHOOK_ID;
use standardwebhooks::{Config, HeaderLookup};

/// A delivery as captured by the transport layer.
#[derive(Debug, Deserialize)]
struct Delivery {
    /// Request headers, any casing
    headers: HashMap<String, String>,
    /// Raw request body
    payload: String,
}

fn main() -> Result<()> {
    // Initialize structured JSON logging on stderr, stdout carries the payload
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(io::stderr))
        .init();

    info!("webhook_verify_starting");

    // Load configuration
    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        secrets = config.secrets.len(),
        tolerance_seconds = config.tolerance_seconds,
        enforce_timestamp = config.enforce_timestamp,
        "config_loaded"
    );

    let webhook = config.webhook().context("Invalid WEBHOOK_SECRET")?;

    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read delivery from stdin")?;
    let delivery: Delivery =
        serde_json::from_str(&input).context("Failed to parse delivery JSON")?;

    let message_id = delivery.headers.header(HEADER_WEBHOOK_ID).unwrap_or_default();
    let result = if config.enforce_timestamp {
        webhook.verify(delivery.payload.as_str(), &delivery.headers)
    } else {
        warn!("webhook_timestamp_enforcement_disabled");
        webhook.verify_ignoring_timestamp(delivery.payload.as_str(), &delivery.headers)
    };

    match result {
        Ok(payload) => {
            info!(
                message_id = %message_id,
                payload_bytes = payload.len(),
                "webhook_verified"
            );
            // Echo the payload byte for byte, no trailing newline
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(payload.as_bytes())
                .context("Failed to write payload")?;
            stdout.flush().context("Failed to flush stdout")?;
            Ok(())
        }
        Err(err) => {
            warn!(message_id = %message_id, error = %err, "webhook_verification_failed");
            Err(err).context("Webhook verification failed")
        }
    }
}
