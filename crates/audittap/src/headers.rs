//! Header normalization.
//!
//! Raw multi-valued HTTP headers become a flat, key-sorted map suitable for
//! JSON records:
//!
//! - hop-by-hop headers are dropped
//! - `Content-Length` becomes `contentLength`
//! - one value is kept as a string, several as a list
//! - `Cookie` headers are split on `;` into one flat list of cookies

use std::collections::BTreeMap;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Normalized header map, ordered by key.
pub type FlatHeaders = BTreeMap<String, HeaderEntry>;

/// The value side of a normalized header: one string, or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderEntry {
    /// A header seen exactly once.
    Single(String),
    /// A repeated header (or the expanded cookie list), in arrival order.
    Multiple(Vec<String>),
}

impl HeaderEntry {
    /// Returns the value if this entry holds exactly one string.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(_) => None,
        }
    }

    /// Returns the first value of the entry.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(values) => values.first().map(String::as_str),
        }
    }
}

impl From<&str> for HeaderEntry {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<String>> for HeaderEntry {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Returns `true` for transport-scoped headers that never appear in records.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Rewrites a hyphenated header name to lower camel case.
///
/// Single-letter segments after the first are left lowercase, so `X-B3-Id`
/// flattens to `xB3Id` but `A-B-C` flattens to `abc`.
///
/// ```
/// use audittap::headers::flatten_key;
///
/// assert_eq!(flatten_key("Content-Length"), "contentLength");
/// assert_eq!(flatten_key("X-Request-ID"), "xRequestId");
/// ```
pub fn flatten_key(name: &str) -> String {
    let mut flat = String::with_capacity(name.len());
    for (i, part) in name.split('-').enumerate() {
        let part = part.to_ascii_lowercase();
        if i == 0 || part.chars().count() <= 1 {
            flat.push_str(&part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                flat.extend(first.to_uppercase());
                flat.push_str(chars.as_str());
            }
        }
    }
    flat
}

/// Normalizes a header map for an audit record.
pub fn normalize(headers: &HeaderMap) -> FlatHeaders {
    let mut flat = FlatHeaders::new();

    for name in headers.keys() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }

        let key = flatten_key(name.as_str());
        let mut values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();

        let entry = if key == "cookie" {
            // Always a list, even for a single cookie.
            HeaderEntry::Multiple(
                values
                    .iter()
                    .flat_map(|v| v.split(';'))
                    .map(|c| c.trim().to_string())
                    .collect(),
            )
        } else if values.len() == 1 {
            HeaderEntry::Single(values.swap_remove(0))
        } else {
            HeaderEntry::Multiple(values)
        };
        flat.insert(key, entry);
    }

    flat
}
