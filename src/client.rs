//! High-level client: fetch pages and download files through the
//! fingerprinted transport.

use std::path::Path;
use std::sync::Arc;

use http::{Method, Request, Uri};
use tokio_util::sync::CancellationToken;

use crate::download::{
    DownloadEngine, DownloadOutcome, ProgressRegistry, ProgressReporter, RetryPolicy,
};
use crate::error::{Error, Result};
use crate::fingerprint::{AlpnOffer, FingerprintSpec};
use crate::headers::{self, RequestOptions};
use crate::response::Response;
use crate::timeouts::Timeouts;
use crate::transport::{BoringConnector, ProxyConfig, RoundTrip, Transport};

/// Client with a browser TLS fingerprint, a proxy tunnel and retrying downloads.
pub struct Client {
    transport: Transport,
    policy: RetryPolicy,
    default_headers: Vec<(String, String)>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

/// Builder for creating clients.
pub struct ClientBuilder {
    proxy: Option<String>,
    policy: RetryPolicy,
    timeouts: Timeouts,
    default_headers: Vec<(String, String)>,
    http2: bool,
    root_certs: Vec<Vec<u8>>,
    reporter: Option<Arc<dyn ProgressReporter>>,
    cancel: CancellationToken,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }

    /// Send one GET and return the response with its body unread. No retry.
    pub async fn get(&self, url: &str, opts: Option<&RequestOptions>) -> Result<Response> {
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::configuration(format!("invalid URL {:?}: {}", url, e)))?;
        let mut request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(())
            .map_err(|e| Error::configuration(format!("invalid request: {}", e)))?;
        *request.headers_mut() =
            headers::to_header_map(headers::resolve(&self.default_headers, opts))?;
        self.transport.round_trip(request).await
    }

    /// Fetch `url` and return the body as text (invalid UTF-8 replaced).
    pub async fn get_text(&self, url: &str, opts: Option<&RequestOptions>) -> Result<String> {
        self.get(url, opts).await?.text().await
    }

    /// Download `url` to `path`, resuming a partial file if present.
    pub async fn download(
        &self,
        url: &str,
        path: &Path,
        opts: Option<&RequestOptions>,
    ) -> Result<DownloadOutcome> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        DownloadEngine::new(self.transport.clone(), self.policy)
            .with_headers(headers::resolve(&self.default_headers, opts))?
            .with_reporter(Arc::clone(&self.reporter))
            .with_cancellation(self.cancel.clone())
            .download(url, path)
            .await
    }

    /// Download `url` to `path`; see [`Client::download`].
    pub async fn download_file(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        opts: Option<&RequestOptions>,
    ) -> Result<()> {
        self.download(url, path.as_ref(), opts).await.map(|_| ())
    }
}

impl ClientBuilder {
    /// Create a new client builder with default settings.
    pub fn new() -> Self {
        Self {
            proxy: None,
            policy: RetryPolicy::default(),
            timeouts: Timeouts::download_defaults(),
            default_headers: headers::headers_to_owned(headers::chrome_112_headers()),
            http2: true,
            root_certs: Vec::new(),
            reporter: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Upstream HTTP proxy, e.g. `http://127.0.0.1:7890`.
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replace the header set sent when a request has no overrides.
    pub fn default_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.default_headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Offer `h2` in ALPN (default). When off only `http/1.1` is offered.
    pub fn http2(mut self, enabled: bool) -> Self {
        self.http2 = enabled;
        self
    }

    /// Trust an extra root certificate (DER or PEM).
    pub fn add_root_certificate(mut self, cert: impl Into<Vec<u8>>) -> Self {
        self.root_certs.push(cert.into());
        self
    }

    /// Where download progress goes. Defaults to the process-wide registry.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Token that aborts running downloads when cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client> {
        let proxy = self.proxy.as_deref().map(ProxyConfig::parse).transpose()?;

        let alpn = if self.http2 {
            AlpnOffer::Http2AndHttp1
        } else {
            AlpnOffer::Http1Only
        };
        let connector = BoringConnector::new(&FingerprintSpec::chrome_112(alpn), &self.root_certs)?;

        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(ProgressRegistry::global().clone()) as Arc<dyn ProgressReporter>);

        Ok(Client {
            transport: Transport::new(proxy, connector, self.timeouts),
            policy: self.policy,
            default_headers: self.default_headers,
            reporter,
            cancel: self.cancel,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
