//! Header extraction and replay checks shared by both verifiers.

use std::time::Duration;

use crate::config::{HEADER_WEBHOOK_ID, HEADER_WEBHOOK_SIGNATURE, HEADER_WEBHOOK_TIMESTAMP};
use crate::error::VerificationError;
use crate::headers::HeaderLookup;
use crate::signature::{parse_signature_header, parse_timestamp, signed_content, SignatureToken};

/// A received delivery whose headers are present and whose timestamp is
/// within tolerance. Signatures are not checked yet.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Delivery<'p, 'h> {
    pub payload: &'p str,
    pub msg_id: &'h str,
    pub signature: &'h str,
    pub timestamp: i64,
}

impl<'p, 'h> Delivery<'p, 'h> {
    /// Decode the payload, read the three headers and check the timestamp.
    ///
    /// Checks run in a fixed order so a delivery with several problems
    /// always reports the same one. `now` of `None` skips the tolerance check.
    pub fn read<H>(
        payload: &'p [u8],
        headers: &'h H,
        now: Option<i64>,
        tolerance: Duration,
    ) -> Result<Self, VerificationError>
    where
        H: HeaderLookup + ?Sized,
    {
        let payload = std::str::from_utf8(payload).map_err(|_| VerificationError::InvalidPayload)?;

        let msg_id = required_header(headers, HEADER_WEBHOOK_ID, VerificationError::MissingId)?;
        let signature = required_header(
            headers,
            HEADER_WEBHOOK_SIGNATURE,
            VerificationError::MissingSignature,
        )?;
        let raw_timestamp = required_header(
            headers,
            HEADER_WEBHOOK_TIMESTAMP,
            VerificationError::MissingTimestamp,
        )?;

        let timestamp = parse_timestamp(raw_timestamp)?;
        if let Some(now) = now {
            check_tolerance(timestamp, now, tolerance)?;
        }

        Ok(Delivery {
            payload,
            msg_id,
            signature,
            timestamp,
        })
    }

    pub fn signed_content(&self) -> String {
        signed_content(self.msg_id, self.timestamp, self.payload)
    }

    pub fn tokens(&self) -> impl Iterator<Item = SignatureToken<'h>> {
        parse_signature_header(self.signature)
    }
}

/// Bounds are inclusive: exactly `now ± tolerance` is accepted.
pub(crate) fn check_tolerance(
    timestamp: i64,
    now: i64,
    tolerance: Duration,
) -> Result<(), VerificationError> {
    let tolerance = i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX);

    if timestamp < now.saturating_sub(tolerance) {
        Err(VerificationError::TimestampTooOld)
    } else if timestamp > now.saturating_add(tolerance) {
        Err(VerificationError::TimestampTooNew)
    } else {
        Ok(())
    }
}

fn required_header<'h, H>(
    headers: &'h H,
    name: &str,
    missing: VerificationError,
) -> Result<&'h str, VerificationError>
where
    H: HeaderLookup + ?Sized,
{
    headers
        .header(name)
        .filter(|value| !value.is_empty())
        .ok_or(missing)
}
