//! HTTP CONNECT tunnelling through an upstream proxy.
//!
//! The tunnel is a plain TCP stream to the proxy on which a `CONNECT`
//! request has been answered with status 200. Anything else closes the
//! connection before a single TLS byte is written.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::BytesMut;
use http::header::{HeaderMap, HeaderValue, PROXY_AUTHORIZATION};
use http::{Method, StatusCode, Uri};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::h1::{self, RequestTarget};
use crate::transport::tcp;

/// Parsed upstream proxy URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    url: Url,
    address: String,
    authorization: Option<HeaderValue>,
}

impl ProxyConfig {
    /// Parse `http://[user:pass@]host[:port]`.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| Error::configuration(format!("invalid proxy URL {:?}: {}", raw, e)))?;
        if url.scheme() != "http" {
            return Err(Error::configuration(format!(
                "unsupported proxy scheme {:?}",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::configuration(format!("proxy URL {:?} has no host", raw)))?;
        let port = url.port_or_known_default().unwrap_or(80);
        let address = format!("{}:{}", host, port);

        let authorization = if url.username().is_empty() {
            None
        } else {
            let credentials = format!("{}:{}", url.username(), url.password().unwrap_or(""));
            let value = format!("Basic {}", STANDARD.encode(credentials));
            Some(HeaderValue::from_str(&value).map_err(|e| {
                Error::configuration(format!("invalid proxy credentials: {}", e))
            })?)
        };

        Ok(Self {
            url,
            address,
            authorization,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host:port` to dial.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// `Proxy-Authorization` value when the URL carries credentials.
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }
}

/// Dial the proxy and open a tunnel to `target`'s authority.
pub async fn open_tunnel(
    proxy: &ProxyConfig,
    target: &Uri,
    connect_timeout: Option<Duration>,
) -> Result<TcpStream> {
    let mut stream = tcp::connect(proxy.address(), connect_timeout)
        .await
        .map_err(|e| match e {
            Error::ConnectTimeout(_) => e,
            other => Error::ProxyConnect(format!(
                "failed to reach proxy {}: {}",
                proxy.address(),
                other
            )),
        })?;

    match establish(&mut stream, proxy.authorization(), target).await {
        Ok(()) => {
            debug!(proxy = proxy.address(), target = %target, "CONNECT tunnel established");
            Ok(stream)
        }
        Err(e) => {
            warn!(proxy = proxy.address(), error = %e, "CONNECT rejected");
            let _ = stream.shutdown().await;
            Err(e)
        }
    }
}

/// Send `CONNECT host:port` on `stream` and require a 200 answer.
pub async fn establish<S>(
    stream: &mut S,
    authorization: Option<&HeaderValue>,
    target: &Uri,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut headers = HeaderMap::new();
    if let Some(auth) = authorization {
        headers.insert(PROXY_AUTHORIZATION, auth.clone());
    }
    let request = h1::build_request(&Method::CONNECT, target, &headers, RequestTarget::Authority)?;

    stream
        .write_all(&request)
        .await
        .map_err(|e| Error::ProxyConnect(format!("failed to send CONNECT: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::ProxyConnect(format!("failed to send CONNECT: {}", e)))?;

    let mut buffer = BytesMut::new();
    let head = h1::read_head(stream, &mut buffer)
        .await
        .map_err(|e| Error::ProxyConnect(format!("failed to read CONNECT response: {}", e)))?;

    if head.status != StatusCode::OK {
        return Err(Error::ProxyConnect(format!(
            "proxy CONNECT failed with status: {}",
            head.status
        )));
    }
    // The origin speaks only after our ClientHello, so nothing may follow.
    if !buffer.is_empty() {
        return Err(Error::ProxyConnect(
            "proxy sent unexpected data after CONNECT response".into(),
        ));
    }
    Ok(())
}
