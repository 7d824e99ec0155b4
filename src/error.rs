//! Error types for the cf-downloader crate.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tunnelling, handshaking, or downloading.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration (e.g. an HTTPS request without a proxy).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// TCP connect to the proxy failed or the proxy refused the CONNECT.
    #[error("proxy CONNECT failed: {0}")]
    ProxyConnect(String),

    /// TLS negotiation did not complete.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// ALPN selected a protocol we did not offer or cannot speak.
    #[error("unsupported ALPN: {0}")]
    UnsupportedProtocol(String),

    /// URL scheme other than http/https.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Unexpected HTTP status.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Response accepted by status but missing a usable Content-Length.
    #[error("invalid content length: {0:?}")]
    InvalidContentLength(Option<u64>),

    /// HTTP protocol error (malformed response, HTTP/2 session failure, ...).
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Connect timeout (TCP connect to proxy or origin).
    #[error("connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// TTFB (time-to-first-byte) timeout.
    #[error("TTFB timeout after {0:?} - server did not respond with headers")]
    TtfbTimeout(Duration),

    /// Read idle timeout (no body data received within duration).
    #[error("read idle timeout after {0:?} - stream may be hung")]
    ReadIdleTimeout(Duration),

    /// The download was cancelled by its owner.
    #[error("download cancelled")]
    Cancelled,

    /// Terminal failure after the retry budget is spent.
    #[error("download failed after {attempts} attempts: {source}")]
    Download {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an HTTP status error.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS handshake error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Handshake(message.into())
    }

    /// Wrap the last attempt's cause into the terminal download error.
    pub fn download(attempts: u32, last: Error) -> Self {
        Self::Download {
            attempts,
            source: Box::new(last),
        }
    }

    /// Whether another attempt could change the outcome.
    ///
    /// Configuration problems and unsupported schemes fail the same way every
    /// time; cancellation is the caller's decision.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Configuration(_)
                | Self::UnsupportedScheme(_)
                | Self::UrlParse(_)
                | Self::Cancelled
                | Self::Download { .. }
        )
    }

    /// Status code carried by this error, if any (looks through `Download`).
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Download { source, .. } => source.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(!Error::configuration("proxy URL is not configured").is_retryable());
        assert!(!Error::UnsupportedScheme("ftp".into()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());

        assert!(Error::ProxyConnect("407".into()).is_retryable());
        assert!(Error::tls("alert").is_retryable());
        assert!(Error::UnsupportedProtocol("spdy/3".into()).is_retryable());
        assert!(Error::http_status(503, "Service Unavailable").is_retryable());
        assert!(Error::InvalidContentLength(None).is_retryable());
        assert!(Error::Io(io::Error::other("disk")).is_retryable());
    }

    #[test]
    fn test_download_error_keeps_last_cause() {
        let err = Error::download(3, Error::http_status(500, "Internal Server Error"));
        assert_eq!(err.status(), Some(500));
        assert_eq!(
            err.to_string(),
            "download failed after 3 attempts: HTTP 500: Internal Server Error"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
