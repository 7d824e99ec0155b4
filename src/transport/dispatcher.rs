//! Per-request routing: scheme, proxy tunnel, handshake, protocol branch.

use std::future::Future;

use http::header::PROXY_AUTHORIZATION;
use http::{Request, Version};
use tracing::debug;

use crate::error::{Error, Result};
use crate::response::Response;
use crate::timeouts::{with_deadline, Timeouts};
use crate::transport::connector::{BoringConnector, MaybeHttpsStream};
use crate::transport::h1::{H1Connection, RequestTarget};
use crate::transport::proxy::{self, ProxyConfig};
use crate::transport::{h2, tcp};
use crate::version::NegotiatedProtocol;

/// One request, one response, no retries.
pub trait RoundTrip: Send + Sync {
    fn round_trip(&self, request: Request<()>) -> impl Future<Output = Result<Response>> + Send;
}

/// Fingerprinted transport.
///
/// `https` goes through a CONNECT tunnel and the BoringSSL handshake, then to
/// HTTP/2 or HTTP/1.1 depending on ALPN. `http` is a plain HTTP/1.1 exchange,
/// forwarded through the proxy when one is configured.
#[derive(Debug, Clone)]
pub struct Transport {
    proxy: Option<ProxyConfig>,
    connector: BoringConnector,
    timeouts: Timeouts,
}

impl Transport {
    pub fn new(proxy: Option<ProxyConfig>, connector: BoringConnector, timeouts: Timeouts) -> Self {
        Self {
            proxy,
            connector,
            timeouts,
        }
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    async fn exchange(&self, request: Request<()>) -> Result<Response> {
        match request.uri().scheme_str() {
            Some("https") => self.exchange_tls(request).await,
            Some("http") => self.exchange_plain(request).await,
            other => Err(Error::UnsupportedScheme(other.unwrap_or("").to_string())),
        }
    }

    async fn exchange_tls(&self, mut request: Request<()>) -> Result<Response> {
        let proxy = self
            .proxy
            .as_ref()
            .ok_or_else(|| Error::configuration("proxy URL is not configured"))?;
        let host = request
            .uri()
            .host()
            .ok_or_else(|| Error::configuration(format!("URL {} has no host", request.uri())))?
            .to_string();

        let tunnel = proxy::open_tunnel(proxy, request.uri(), self.timeouts.connect).await?;
        let stream = self.connector.handshake(tunnel, &host).await?;
        let protocol = stream.negotiated_protocol()?;

        *request.version_mut() = protocol.http_version();
        debug!(host, protocol = protocol.as_str(), "sending request");

        match protocol {
            NegotiatedProtocol::Http2 => h2::send_request(stream, request).await,
            NegotiatedProtocol::Http1_1 => {
                H1Connection::new(stream)
                    .send_request(&request, RequestTarget::Origin)
                    .await
            }
        }
    }

    async fn exchange_plain(&self, mut request: Request<()>) -> Result<Response> {
        *request.version_mut() = Version::HTTP_11;

        let (stream, target) = match &self.proxy {
            Some(proxy) => {
                let stream = tcp::connect(proxy.address(), self.timeouts.connect)
                    .await
                    .map_err(|e| match e {
                        Error::ConnectTimeout(_) => e,
                        other => Error::ProxyConnect(format!(
                            "failed to reach proxy {}: {}",
                            proxy.address(),
                            other
                        )),
                    })?;
                if let Some(auth) = proxy.authorization() {
                    request
                        .headers_mut()
                        .insert(PROXY_AUTHORIZATION, auth.clone());
                }
                (stream, RequestTarget::Absolute)
            }
            None => {
                let host = request.uri().host().ok_or_else(|| {
                    Error::configuration(format!("URL {} has no host", request.uri()))
                })?;
                let addr = format!("{}:{}", host, request.uri().port_u16().unwrap_or(80));
                (
                    tcp::connect(&addr, self.timeouts.connect).await?,
                    RequestTarget::Origin,
                )
            }
        };

        debug!(uri = %request.uri(), ?target, "sending plain HTTP request");
        H1Connection::new(MaybeHttpsStream::Http(stream))
            .send_request(&request, target)
            .await
    }
}

impl RoundTrip for Transport {
    async fn round_trip(&self, request: Request<()>) -> Result<Response> {
        let response =
            with_deadline(self.timeouts.ttfb, self.exchange(request), Error::TtfbTimeout).await?;
        Ok(response.with_read_idle(self.timeouts.read_idle))
    }
}
