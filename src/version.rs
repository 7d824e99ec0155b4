//! Application protocol selected during the TLS handshake.

use http::Version;

use crate::error::{Error, Result};

/// Protocol agreed through ALPN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedProtocol {
    /// "http/1.1", or no ALPN selection at all.
    Http1_1,
    /// "h2".
    Http2,
}

impl NegotiatedProtocol {
    /// Map the server's ALPN selection to a protocol.
    ///
    /// A server that ignores ALPN is treated as HTTP/1.1. Any other
    /// identifier is rejected rather than guessed at.
    pub fn from_alpn(selected: Option<&[u8]>) -> Result<Self> {
        match selected {
            None | Some(b"") | Some(b"http/1.1") => Ok(Self::Http1_1),
            Some(b"h2") => Ok(Self::Http2),
            Some(other) => Err(Error::UnsupportedProtocol(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    /// Get human-readable version string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http1_1 => "HTTP/1.1",
            Self::Http2 => "HTTP/2",
        }
    }

    /// Version stamped on requests sent over this protocol.
    pub fn http_version(&self) -> Version {
        match self {
            Self::Http1_1 => Version::HTTP_11,
            Self::Http2 => Version::HTTP_2,
        }
    }
}
