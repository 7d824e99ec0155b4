//! # cf-downloader
//!
//! Resumable file downloader that looks like Chrome on the wire.
//!
//! HTTPS requests go through an HTTP CONNECT proxy, then a BoringSSL handshake
//! with a fixed Chrome 112 ClientHello, then HTTP/2 or HTTP/1.1 depending on
//! what ALPN settles on. Downloads resume from whatever is already on disk.

pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod fingerprint;
pub mod headers;
pub mod response;
pub mod timeouts;
pub mod transport;
pub mod version;

// Re-exports
pub use client::{Client, ClientBuilder};
pub use config::Config;
pub use download::{
    DownloadEngine, DownloadOutcome, NoopReporter, ProgressHandle, ProgressRegistry,
    ProgressReporter, RetryPolicy,
};
pub use error::{Error, Result};
pub use fingerprint::{AlpnOffer, FingerprintSpec};
pub use headers::RequestOptions;
pub use response::{Body, Response};
pub use timeouts::Timeouts;
pub use transport::{RoundTrip, Transport};
pub use version::NegotiatedProtocol;
