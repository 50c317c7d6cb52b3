//! Test fixtures for sinks, renderers and taps.
//!
//! # Example
//!
//! ```
//! use audittap::fixtures;
//!
//! let summary = fixtures::summary("/a/b/c");
//! assert_eq!(summary.request.path, "/a/b/c");
//! assert_eq!(summary.response.status, 200);
//! ```

use chrono::{DateTime, TimeZone, Utc};

use crate::clock::FixedClock;
use crate::headers::FlatHeaders;
use crate::summary::{RequestSummary, ResponseSummary, Summary};

/// The instant every fixture is stamped with: 2001-09-09T01:46:40Z.
#[must_use]
pub fn instant() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_000_000_000, 0).unwrap_or_else(|| Utc.timestamp_nanos(0))
}

/// A clock frozen at [`instant`].
#[must_use]
pub fn fixed_clock() -> FixedClock {
    FixedClock::new(instant())
}

/// A `GET` summary for `path` with a `200` response and no headers.
#[must_use]
pub fn summary(path: &str) -> Summary {
    Summary::new(
        RequestSummary {
            source: String::new(),
            audit_type: String::new(),
            host: "localhost".into(),
            method: "GET".into(),
            path: path.into(),
            query: String::new(),
            remote_addr: "127.0.0.1:50000".into(),
            header: FlatHeaders::new(),
            began_at: instant(),
        },
        ResponseSummary {
            source: String::new(),
            audit_type: String::new(),
            status: 200,
            header: FlatHeaders::new(),
            size: 0,
            completed_at: instant(),
        },
    )
}
