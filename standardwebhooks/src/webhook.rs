//! Webhook signer and verifier.
//!
//! A [`Webhook`] owns one or more decoded secrets. The first secret signs
//! outgoing deliveries; verification accepts a `v1` token produced by any of
//! them, which lets receivers roll secrets without dropping deliveries.

use std::iter;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, trace};

use crate::config::DEFAULT_TOLERANCE;
use crate::delivery::Delivery;
use crate::error::{VerificationError, WebhookError};
use crate::headers::{HeaderLookup, WebhookHeaders};
use crate::secret::SigningSecret;
use crate::signature::{constant_time_eq, format_token, signed_content};

/// Signs and verifies Standard Webhooks deliveries.
#[derive(Debug, Clone)]
pub struct Webhook {
    primary: SigningSecret,
    fallbacks: Vec<SigningSecret>,
    tolerance: Duration,
}

impl Webhook {
    /// Create a webhook from a base64 secret, optionally prefixed with `whsec_`.
    ///
    /// # Errors
    ///
    /// Fails on an empty secret or invalid base64. Both are configuration
    /// bugs, so they surface here rather than at verification time.
    pub fn new(secret: &str) -> Result<Self, WebhookError> {
        Ok(Self::from_secret(SigningSecret::from_base64(secret)?))
    }

    /// Create a webhook from a base64 secret given as UTF-8 bytes.
    pub fn from_utf8_bytes(secret: &[u8]) -> Result<Self, WebhookError> {
        Ok(Self::from_secret(SigningSecret::from_utf8(secret)?))
    }

    /// Create a webhook from raw key bytes, skipping prefix and base64 handling.
    pub fn from_raw_key(key: &[u8]) -> Result<Self, WebhookError> {
        Ok(Self::from_secret(SigningSecret::from_raw(key)?))
    }

    fn from_secret(primary: SigningSecret) -> Self {
        debug!(
            secrets = 1,
            tolerance_seconds = DEFAULT_TOLERANCE.as_secs(),
            "webhook_created"
        );

        Webhook {
            primary,
            fallbacks: Vec::new(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Override the accepted clock skew (default five minutes).
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Accept signatures made with an additional base64 secret.
    pub fn with_secret(mut self, secret: &str) -> Result<Self, WebhookError> {
        self.fallbacks.push(SigningSecret::from_base64(secret)?);
        debug!(secrets = self.secret_count(), "webhook_secret_added");
        Ok(self)
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Number of secrets accepted during verification.
    pub fn secret_count(&self) -> usize {
        1 + self.fallbacks.len()
    }

    fn secrets(&self) -> impl Iterator<Item = &SigningSecret> {
        iter::once(&self.primary).chain(&self.fallbacks)
    }

    /// Sign a delivery with the primary secret.
    ///
    /// The timestamp is normalized to UTC and floored to whole seconds.
    /// Returns a token such as `v1,g0hM9SsE+OTPJTGt/tmIKtSyZlE3uFJELVlNIOLJ1OE=`.
    pub fn sign<Tz: TimeZone>(&self, msg_id: &str, timestamp: &DateTime<Tz>, payload: &str) -> String {
        self.sign_unix(msg_id, timestamp.timestamp(), payload)
    }

    /// Sign a delivery whose timestamp is given in Unix epoch seconds.
    pub fn sign_unix(&self, msg_id: &str, timestamp: i64, payload: &str) -> String {
        let content = signed_content(msg_id, timestamp, payload);
        format_token(&self.primary.mac(content.as_bytes()))
    }

    /// Sign with every configured secret, tokens separated by single spaces.
    pub fn sign_all<Tz: TimeZone>(
        &self,
        msg_id: &str,
        timestamp: &DateTime<Tz>,
        payload: &str,
    ) -> String {
        let content = signed_content(msg_id, timestamp.timestamp(), payload);
        self.secrets()
            .map(|secret| format_token(&secret.mac(content.as_bytes())))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the headers of an outgoing delivery.
    pub fn sign_headers<Tz: TimeZone>(
        &self,
        msg_id: &str,
        timestamp: &DateTime<Tz>,
        payload: &str,
    ) -> WebhookHeaders {
        WebhookHeaders {
            id: msg_id.to_string(),
            timestamp: timestamp.timestamp().to_string(),
            signature: self.sign_all(msg_id, timestamp, payload),
        }
    }

    /// Verify a received delivery against the current wall clock.
    ///
    /// On success the payload is returned unchanged, ready to hand to a
    /// parser. Tokens with an unknown version or malformed base64 are
    /// skipped; the first matching `v1` token wins.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use standardwebhooks::Webhook;
    ///
    /// let webhook = Webhook::new("whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw").unwrap();
    /// let payload = r#"{"test": 2432232314}"#;
    /// let headers = webhook.sign_headers("msg_p5jXN8AQM9LWM0D4loKWxJek", &Utc::now(), payload);
    ///
    /// assert_eq!(webhook.verify(payload, &headers), Ok(payload));
    /// ```
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
    ///
    /// Only use this when replay protection is handled elsewhere.
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
        let expected: Vec<Vec<u8>> = self
            .secrets()
            .map(|secret| secret.mac(content.as_bytes()))
            .collect();

        for token in delivery.tokens() {
            if !token.is_supported() {
                trace!(version = token.version, "webhook_signature_version_skipped");
                continue;
            }

            let Some(provided) = token.decode() else {
                trace!("webhook_signature_malformed_skipped");
                continue;
            };

            if expected
                .iter()
                .any(|expected| constant_time_eq(expected, &provided))
            {
                return Ok(delivery.payload);
            }
        }

        Err(VerificationError::NoMatchingSignature)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use chrono::FixedOffset;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use super::*;

    const SECRET: &str = "MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
    const MSG_ID: &str = "msg_p5jXN8AQM9LWM0D4loKWxJek";
    const PAYLOAD: &str = r#"{"test": 2432232314}"#;
    const NOW: i64 = 1_700_000_000;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn headers_for(webhook: &Webhook, timestamp: i64) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("webhook-id".to_string(), MSG_ID.to_string());
        headers.insert("webhook-timestamp".to_string(), timestamp.to_string());
        headers.insert(
            "webhook-signature".to_string(),
            webhook.sign_unix(MSG_ID, timestamp, PAYLOAD),
        );
        headers
    }

    #[test]
    fn test_sign_known_vector() {
        let webhook = Webhook::new("whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw").unwrap();
        assert_eq!(
            webhook.sign(MSG_ID, &at(1614265330), PAYLOAD),
            "v1,g0hM9SsE+OTPJTGt/tmIKtSyZlE3uFJELVlNIOLJ1OE="
        );
    }

    #[test]
    fn test_sign_second_known_vector() {
        let webhook = Webhook::new("whsec_C2FVsBQIhrscChlQIMV+b5sSYspob7oD").unwrap();
        assert_eq!(
            webhook.sign_unix(
                "msg_27UH4WbU6Z5A5EzD8u03UvzRbpk",
                1649367553,
                r#"{"email":"test@example.com","username":"test_user"}"#
            ),
            "v1,tZ1I4/hDygAJgO5TYxiSd6Sd0kDW6hPenDe+bTa3Kkw="
        );
    }

    #[test]
    fn test_sign_normalizes_timezone_and_floors() {
        let webhook = Webhook::new(SECRET).unwrap();
        let utc = webhook.sign(MSG_ID, &at(1614265330), PAYLOAD);

        let offset = FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .timestamp_opt(1614265330, 0)
            .unwrap();
        assert_eq!(webhook.sign(MSG_ID, &offset, PAYLOAD), utc);

        let fractional = DateTime::from_timestamp(1614265330, 999_000_000).unwrap();
        assert_eq!(webhook.sign(MSG_ID, &fractional, PAYLOAD), utc);
    }

    #[test]
    fn test_sign_is_deterministic() {
        let webhook = Webhook::new(SECRET).unwrap();
        assert_eq!(
            webhook.sign_unix(MSG_ID, NOW, PAYLOAD),
            webhook.sign_unix(MSG_ID, NOW, PAYLOAD)
        );
    }

    #[test]
    fn test_verify_returns_payload() {
        let webhook = Webhook::new(SECRET).unwrap();
        let headers = headers_for(&webhook, NOW);

        assert_eq!(webhook.verify_at(PAYLOAD, &headers, &at(NOW)), Ok(PAYLOAD));
        assert_eq!(
            webhook.verify_at(PAYLOAD.as_bytes(), &headers, &at(NOW)),
            Ok(PAYLOAD)
        );
    }

    #[test]
    fn test_verify_with_wall_clock() {
        let webhook = Webhook::new(SECRET).unwrap();
        let headers = headers_for(&webhook, Utc::now().timestamp());

        assert_eq!(webhook.verify(PAYLOAD, &headers), Ok(PAYLOAD));
    }

    #[test]
    fn test_verify_missing_headers() {
        let webhook = Webhook::new(SECRET).unwrap();

        for (name, expected) in [
            ("webhook-id", VerificationError::MissingId),
            ("webhook-signature", VerificationError::MissingSignature),
            ("webhook-timestamp", VerificationError::MissingTimestamp),
        ] {
            let mut headers = headers_for(&webhook, NOW);
            headers.remove(name);
            assert_eq!(webhook.verify_at(PAYLOAD, &headers, &at(NOW)), Err(expected.clone()));

            let mut headers = headers_for(&webhook, NOW);
            headers.insert(name.to_string(), String::new());
            assert_eq!(webhook.verify_at(PAYLOAD, &headers, &at(NOW)), Err(expected));
        }
    }

    #[test]
    fn test_verify_invalid_timestamp() {
        let webhook = Webhook::new(SECRET).unwrap();
        let mut headers = headers_for(&webhook, NOW);
        headers.insert("webhook-timestamp".to_string(), "hello".to_string());

        assert_eq!(
            webhook.verify_at(PAYLOAD, &headers, &at(NOW)),
            Err(VerificationError::InvalidTimestamp)
        );
    }

    #[test]
    fn test_verify_tolerance_window() {
        let webhook = Webhook::new(SECRET).unwrap();
        let tolerance = DEFAULT_TOLERANCE.as_secs() as i64;

        let too_old = headers_for(&webhook, NOW - tolerance - 1);
        assert_eq!(
            webhook.verify_at(PAYLOAD, &too_old, &at(NOW)),
            Err(VerificationError::TimestampTooOld)
        );

        let too_new = headers_for(&webhook, NOW + tolerance + 1);
        assert_eq!(
            webhook.verify_at(PAYLOAD, &too_new, &at(NOW)),
            Err(VerificationError::TimestampTooNew)
        );
    }

    #[test]
    fn test_verify_tolerance_bounds_are_inclusive() {
        let webhook = Webhook::new(SECRET).unwrap();
        let tolerance = DEFAULT_TOLERANCE.as_secs() as i64;

        for timestamp in [NOW - tolerance, NOW + tolerance] {
            let headers = headers_for(&webhook, timestamp);
            assert_eq!(webhook.verify_at(PAYLOAD, &headers, &at(NOW)), Ok(PAYLOAD));
        }
    }

    #[test]
    fn test_custom_tolerance() {
        let webhook = Webhook::new(SECRET)
            .unwrap()
            .with_tolerance(Duration::from_secs(10));

        let headers = headers_for(&webhook, NOW - 11);
        assert_eq!(
            webhook.verify_at(PAYLOAD, &headers, &at(NOW)),
            Err(VerificationError::TimestampTooOld)
        );

        let headers = headers_for(&webhook, NOW - 10);
        assert_eq!(webhook.verify_at(PAYLOAD, &headers, &at(NOW)), Ok(PAYLOAD));
    }

    #[test]
    fn test_verify_ignoring_timestamp() {
        let webhook = Webhook::new(SECRET).unwrap();
        let headers = headers_for(&webhook, 946684800);

        assert_eq!(webhook.verify_ignoring_timestamp(PAYLOAD, &headers), Ok(PAYLOAD));
        assert_eq!(
            webhook.verify_ignoring_timestamp(r#"{"test": 1}"#, &headers),
            Err(VerificationError::NoMatchingSignature)
        );
    }

    #[test]
    fn test_verify_multiple_signatures() {
        let webhook = Webhook::new(SECRET).unwrap();
        let mut headers = headers_for(&webhook, NOW);
        let valid = headers["webhook-signature"].clone();
        headers.insert(
            "webhook-signature".to_string(),
            format!(
                "v1,Ceo5qEr07ixe2NLpvHk3FH9bwy/WavXrAFQ/9tdO6mc= \
                 v2,Ceo5qEr07ixe2NLpvHk3FH9bwy/WavXrAFQ/9tdO6mc= \
                 {valid} \
                 v1,Ceo5qEr07ixe2NLpvHk3FH9bwy/WavXrAFQ/9tdO6mc="
            ),
        );

        assert_eq!(webhook.verify_at(PAYLOAD, &headers, &at(NOW)), Ok(PAYLOAD));
    }

    #[test]
    fn test_verify_skips_malformed_tokens() {
        let webhook = Webhook::new(SECRET).unwrap();
        let mut headers = headers_for(&webhook, NOW);
        let valid = headers["webhook-signature"].clone();
        headers.insert(
            "webhook-signature".to_string(),
            format!("v1,%%%not-base64%%% nocomma  {valid}"),
        );

        assert_eq!(webhook.verify_at(PAYLOAD, &headers, &at(NOW)), Ok(PAYLOAD));
    }

    #[test]
    fn test_verify_rejects_only_other_versions() {
        let webhook = Webhook::new(SECRET).unwrap();
        let mut headers = headers_for(&webhook, NOW);
        let valid = headers["webhook-signature"].replacen("v1,", "v1a,", 1);
        headers.insert("webhook-signature".to_string(), valid);

        assert_eq!(
            webhook.verify_at(PAYLOAD, &headers, &at(NOW)),
            Err(VerificationError::NoMatchingSignature)
        );
    }

    #[test]
    fn test_verify_tampered_payload_and_wrong_secret() {
        let webhook = Webhook::new(SECRET).unwrap();
        let headers = headers_for(&webhook, NOW);

        assert_eq!(
            webhook.verify_at(r#"{"test": 2432232315}"#, &headers, &at(NOW)),
            Err(VerificationError::NoMatchingSignature)
        );

        let other = Webhook::new("C2FVsBQIhrscChlQIMV+b5sSYspob7oD").unwrap();
        assert_eq!(
            other.verify_at(PAYLOAD, &headers, &at(NOW)),
            Err(VerificationError::NoMatchingSignature)
        );
    }

    #[test]
    fn test_verify_rejects_non_utf8_payload() {
        let webhook = Webhook::new(SECRET).unwrap();
        let headers = headers_for(&webhook, NOW);

        assert_eq!(
            webhook.verify_at(&[0xffu8, 0xfe][..], &headers, &at(NOW)),
            Err(VerificationError::InvalidPayload)
        );
    }

    #[test]
    fn test_rotation_accepts_either_secret() {
        let old = Webhook::new(SECRET).unwrap();
        let new = Webhook::new("C2FVsBQIhrscChlQIMV+b5sSYspob7oD").unwrap();
        let rotating = Webhook::new("C2FVsBQIhrscChlQIMV+b5sSYspob7oD")
            .unwrap()
            .with_secret(SECRET)
            .unwrap();

        for signer in [&old, &new] {
            let headers = headers_for(signer, NOW);
            assert_eq!(rotating.verify_at(PAYLOAD, &headers, &at(NOW)), Ok(PAYLOAD));
        }

        assert_eq!(
            rotating.sign_unix(MSG_ID, NOW, PAYLOAD),
            new.sign_unix(MSG_ID, NOW, PAYLOAD)
        );
    }

    #[test]
    fn test_sign_all_emits_one_token_per_secret() {
        let rotating = Webhook::new(SECRET)
            .unwrap()
            .with_secret("C2FVsBQIhrscChlQIMV+b5sSYspob7oD")
            .unwrap();
        let tokens = rotating.sign_all(MSG_ID, &at(NOW), PAYLOAD);

        assert_eq!(tokens.split(' ').count(), 2);
        assert!(tokens.starts_with(&rotating.sign_unix(MSG_ID, NOW, PAYLOAD)));
    }

    #[test]
    fn test_sign_headers_round_trip() {
        let webhook = Webhook::new(SECRET).unwrap();
        let headers = webhook.sign_headers(MSG_ID, &at(NOW), PAYLOAD);

        assert_eq!(headers.id, MSG_ID);
        assert_eq!(headers.timestamp, NOW.to_string());
        assert_eq!(webhook.verify_at(PAYLOAD, &headers, &at(NOW)), Ok(PAYLOAD));
    }

    #[test]
    fn test_raw_key_matches_encoded_secret() {
        let encoded = Webhook::new(SECRET).unwrap();
        let raw = Webhook::from_raw_key(&[
            0x31, 0xf2, 0x90, 0xf6, 0xbf, 0x06, 0x29, 0x8a, 0xab, 0x4f, 0x08, 0xd4, 0x3c, 0x3f,
            0x08, 0x2c, 0xf6, 0x48, 0xa3, 0x62, 0xda, 0x2d, 0xa4, 0xb0,
        ])
        .unwrap();

        assert_eq!(
            raw.sign_unix(MSG_ID, NOW, PAYLOAD),
            encoded.sign_unix(MSG_ID, NOW, PAYLOAD)
        );
    }

    /// Records every event as `field=value` pairs.
    #[derive(Clone, Default)]
    struct EventCapture {
        events: Arc<Mutex<Vec<String>>>,
    }

    struct FieldWriter(String);

    impl Visit for FieldWriter {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.push_str(&format!("{}={:?} ", field.name(), value));
        }
    }

    impl<S: Subscriber> Layer<S> for EventCapture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut writer = FieldWriter(String::new());
            event.record(&mut writer);
            self.events.lock().unwrap().push(writer.0);
        }
    }

    #[test]
    fn test_construction_logs_secret_count() {
        let capture = EventCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            Webhook::new(SECRET)
                .unwrap()
                .with_secret("C2FVsBQIhrscChlQIMV+b5sSYspob7oD")
                .unwrap();
        });

        let events = capture.events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| e.contains("message=webhook_created") && e.contains("secrets=1")));
        assert!(events
            .iter()
            .any(|e| e.contains("message=webhook_secret_added") && e.contains("secrets=2")));
        assert!(events.iter().all(|e| !e.contains(SECRET)));
    }
}
