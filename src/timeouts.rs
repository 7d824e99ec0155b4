//! Timeout configuration for tunnelled requests.
//!
//! # Timeout Types
//!
//! - **connect**: TCP connect to the proxy (or origin for plain HTTP)
//! - **ttfb**: start of the attempt (including CONNECT and TLS handshake)
//!   until response headers received
//! - **read_idle**: maximum time between body chunks (resets on each chunk)
//!
//! # Usage
//!
//! ```rust,ignore
//! use cf_downloader::{Client, Timeouts};
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .proxy("http://127.0.0.1:7890")
//!     .timeouts(Timeouts::download_defaults().read_idle(Duration::from_secs(300)))
//!     .build()?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Timeout configuration for a single request attempt.
///
/// All timeouts are optional. When `None`, no timeout is applied for that phase.
#[derive(Clone, Debug, Default)]
pub struct Timeouts {
    /// Deadline for the TCP connect. Does NOT reset.
    ///
    /// Default: 10s
    pub connect: Option<Duration>,

    /// Deadline from the start of an attempt until response headers are
    /// received. Covers the CONNECT exchange and the TLS handshake.
    ///
    /// Default: 30s
    pub ttfb: Option<Duration>,

    /// Maximum wait for the next body chunk.
    ///
    /// **This timeout resets on each successful read.** It detects hung
    /// streams without killing healthy long-running transfers.
    ///
    /// Default: 60s
    pub read_idle: Option<Duration>,
}

impl Timeouts {
    /// Create a new Timeouts with all timeouts set to None.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for large file downloads.
    ///
    /// - connect: 10s
    /// - ttfb: 30s
    /// - read_idle: 60s
    pub fn download_defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            ttfb: Some(Duration::from_secs(30)),
            read_idle: Some(Duration::from_secs(60)),
        }
    }

    /// Set connect timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    /// Set TTFB (time-to-first-byte) timeout.
    pub fn ttfb(mut self, timeout: Duration) -> Self {
        self.ttfb = Some(timeout);
        self
    }

    /// Set read idle timeout.
    pub fn read_idle(mut self, timeout: Duration) -> Self {
        self.read_idle = Some(timeout);
        self
    }

    /// Disable connect timeout.
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect = None;
        self
    }

    /// Disable TTFB timeout.
    pub fn no_ttfb_timeout(mut self) -> Self {
        self.ttfb = None;
        self
    }

    /// Disable read idle timeout.
    pub fn no_read_idle_timeout(mut self) -> Self {
        self.read_idle = None;
        self
    }
}

/// Run `fut` under an optional deadline, mapping expiry through `on_elapsed`.
pub async fn with_deadline<F, T>(
    limit: Option<Duration>,
    fut: F,
    on_elapsed: fn(Duration) -> Error,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| on_elapsed(limit))?,
        None => fut.await,
    }
}
