#![allow(dead_code)]

pub mod mock_proxy;
pub mod mock_server;
pub mod tls;

use std::sync::Arc;
use std::time::Duration;

use cf_downloader::{Client, NoopReporter, RetryPolicy};

/// Client trusting `ca_pem`, tunnelling through `proxy_url`, with fast retries
/// and no progress output.
pub fn test_client(proxy_url: &str, ca_pem: &[u8], http2: bool) -> Client {
    Client::builder()
        .proxy(proxy_url)
        .add_root_certificate(ca_pem.to_vec())
        .http2(http2)
        .retry_policy(RetryPolicy::new(3, Duration::from_millis(10)).unwrap())
        .progress_reporter(Arc::new(NoopReporter))
        .build()
        .expect("Failed to build client")
}

/// Deterministic payload that makes offset mistakes visible.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
