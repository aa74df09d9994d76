//! Case-insensitive access to delivery headers.
//!
//! Transport layers disagree on header casing, so lookups never rely on the
//! caller having normalized names.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use http::header::{HeaderMap, HeaderValue, InvalidHeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::{HEADER_WEBHOOK_ID, HEADER_WEBHOOK_SIGNATURE, HEADER_WEBHOOK_TIMESTAMP};

/// A source of header values, looked up by name regardless of case.
pub trait HeaderLookup {
    /// Return the value stored under `name`, compared case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;
}

impl<T: HeaderLookup + ?Sized> HeaderLookup for &T {
    fn header(&self, name: &str) -> Option<&str> {
        (**self).header(name)
    }
}

impl<K, V, S> HeaderLookup for HashMap<K, V, S>
where
    K: AsRef<str>,
    V: AsRef<str>,
    S: BuildHasher,
{
    fn header(&self, name: &str) -> Option<&str> {
        find_pair(self.iter(), name)
    }
}

impl<K, V> HeaderLookup for BTreeMap<K, V>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn header(&self, name: &str) -> Option<&str> {
        find_pair(self.iter(), name)
    }
}

impl<K, V> HeaderLookup for [(K, V)]
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn header(&self, name: &str) -> Option<&str> {
        find_pair(self.iter().map(|(k, v)| (k, v)), name)
    }
}

impl<K, V> HeaderLookup for Vec<(K, V)>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

/// Values that are not visible ASCII are treated as absent.
impl HeaderLookup for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name.to_ascii_lowercase().as_str())
            .and_then(|value| value.to_str().ok())
    }
}

/// Pick among keys that differ only in case. A non-empty value wins, then
/// the key spelled exactly as `name`, then the smallest key. The result never
/// depends on iteration order.
fn find_pair<'a, K, V>(pairs: impl Iterator<Item = (&'a K, &'a V)>, name: &str) -> Option<&'a str>
where
    K: AsRef<str> + 'a,
    V: AsRef<str> + 'a,
{
    pairs
        .filter(|&(key, _)| key.as_ref().eq_ignore_ascii_case(name))
        .min_by_key(|&(key, value)| {
            let key = key.as_ref();
            (value.as_ref().is_empty(), key != name, key)
        })
        .map(|(_, value)| value.as_ref())
}

/// The three headers of a signed delivery, named as they appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookHeaders {
    /// Unique message identifier
    #[serde(rename = "webhook-id")]
    pub id: String,

    /// Unix epoch seconds, as a decimal string
    #[serde(rename = "webhook-timestamp")]
    pub timestamp: String,

    /// Space separated `v1,<base64>` tokens
    #[serde(rename = "webhook-signature")]
    pub signature: String,
}

impl WebhookHeaders {
    /// Convert into an `http` header map for an outgoing request.
    pub fn to_header_map(&self) -> Result<HeaderMap, InvalidHeaderValue> {
        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(HEADER_WEBHOOK_ID, HeaderValue::from_str(&self.id)?);
        headers.insert(HEADER_WEBHOOK_TIMESTAMP, HeaderValue::from_str(&self.timestamp)?);
        headers.insert(HEADER_WEBHOOK_SIGNATURE, HeaderValue::from_str(&self.signature)?);
        Ok(headers)
    }
}

impl HeaderLookup for WebhookHeaders {
    fn header(&self, name: &str) -> Option<&str> {
        if name.eq_ignore_ascii_case(HEADER_WEBHOOK_ID) {
            Some(self.id.as_str())
        } else if name.eq_ignore_ascii_case(HEADER_WEBHOOK_TIMESTAMP) {
            Some(self.timestamp.as_str())
        } else if name.eq_ignore_ascii_case(HEADER_WEBHOOK_SIGNATURE) {
            Some(self.signature.as_str())
        } else {
            None
        }
    }
}
