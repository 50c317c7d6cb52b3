//! Common HTTP types used by the tap.

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;

/// The HTTP request type handed to the tap.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type produced by [`serve_buffered`](crate::AuditTap::serve_buffered).
pub type Response = http::Response<Full<Bytes>>;

/// Peer address of the connection, stored as a request extension.
///
/// The server inserts this when it accepts the connection; the tap reads it
/// into `remoteAddr`.
///
/// ```
/// use audittap::{RemoteAddr, Request};
///
/// let mut request = Request::new(Default::default());
/// request.extensions_mut().insert(RemoteAddr("10.1.2.3:4567".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_addr_display() {
        let addr = RemoteAddr("101.102.103.104:1234".parse().unwrap());
        assert_eq!(addr.to_string(), "101.102.103.104:1234");

        let addr = RemoteAddr("[::1]:8080".parse().unwrap());
        assert_eq!(addr.to_string(), "[::1]:8080");
    }
}
