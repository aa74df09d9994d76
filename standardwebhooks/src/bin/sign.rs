//! Webhook Sign - signs an outgoing delivery.
//!
//! Reads the payload from stdin, signs it with the first secret in
//! `WEBHOOK_SECRET` (and every other configured secret), and prints the
//! delivery headers as JSON on stdout. Logs go to stderr.

use std::io::{self, Read};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use standardwebhooks::Config;

fn main() -> Result<()> {
    // Initialize structured JSON logging on stderr, stdout carries the headers
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(io::stderr))
        .init();

    info!("webhook_sign_starting");

    // Load configuration
    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        secrets = config.secrets.len(),
        message_id = ?config.message_id,
        timestamp = ?config.timestamp,
        "config_loaded"
    );

    let webhook = config.webhook().context("Invalid WEBHOOK_SECRET")?;
    let msg_id = config
        .message_id
        .as_deref()
        .context("WEBHOOK_ID is not set")?;
    let timestamp = match config.timestamp {
        Some(seconds) => {
            DateTime::from_timestamp(seconds, 0).context("WEBHOOK_TIMESTAMP is out of range")?
        }
        None => Utc::now(),
    };

    let mut payload = String::new();
    io::stdin()
        .read_to_string(&mut payload)
        .context("Failed to read payload from stdin")?;

    let headers = webhook.sign_headers(msg_id, &timestamp, &payload);
    let output = serde_json::to_string_pretty(&headers).context("Failed to encode headers")?;
    println!("{output}");

    info!(
        message_id = %headers.id,
        timestamp = %headers.timestamp,
        payload_bytes = payload.len(),
        "webhook_signed"
    );

    Ok(())
}
