//! BoringSSL TLS connector driven by a [`FingerprintSpec`].

use boring::ssl::{
    ConnectConfiguration, SslConnector, SslMethod, SslOptions, SslSessionCacheMode, SslVersion,
};
use boring::x509::X509;
use foreign_types::ForeignTypeRef;
use std::io;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fingerprint::{CertCompression, FingerprintSpec, TlsVersion};
use crate::version::NegotiatedProtocol;

// FFI bindings for BoringSSL extension control
use boring_sys::{CRYPTO_BUFFER, SSL, SSL_CTX};
use std::os::raw::c_int;

extern "C" {
    /// Enable GREASE (Generate Random Extensions And Sustain Extensibility)
    fn SSL_CTX_set_grease_enabled(ctx: *mut SSL_CTX, enabled: c_int);
    /// Toggle per-connection extension order permutation
    fn SSL_CTX_set_permute_extensions(ctx: *mut SSL_CTX, enabled: c_int);
}

/// Extension ids the connector toggles explicitly.
const EXT_STATUS_REQUEST: u16 = 5;
const EXT_SESSION_TICKET: u16 = 35;
const EXT_SIGNED_CERT_TIMESTAMP: u16 = 18;

/// Brotli certificate decompression callback for BoringSSL.
///
/// Called when the server sends a Brotli-compressed certificate chain.
unsafe extern "C" fn decompress_brotli_cert(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);

    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = brotli::Decompressor::new(compressed, uncompressed_len);
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) if decompressed.len() == uncompressed_len => {
            // CRYPTO_BUFFER_new copies the data; pool may be null.
            let buffer = boring_sys::CRYPTO_BUFFER_new(
                decompressed.as_ptr(),
                decompressed.len(),
                std::ptr::null_mut(),
            );
            if buffer.is_null() {
                return 0;
            }
            *out = buffer;
            1
        }
        _ => 0,
    }
}

/// BoringSSL-based TLS connector.
///
/// The SSL context is built once from the fingerprint; every handshake made
/// through the same connector sends the same ClientHello apart from GREASE
/// values, the random and the key shares.
#[derive(Clone)]
pub struct BoringConnector {
    connector: SslConnector,
    application_settings: Vec<&'static str>,
}

impl std::fmt::Debug for BoringConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoringConnector")
            .field("application_settings", &self.application_settings)
            .finish_non_exhaustive()
    }
}

impl BoringConnector {
    /// Create a connector for `spec`, trusting the system roots plus
    /// `root_certs` (DER or PEM).
    pub fn new(spec: &FingerprintSpec, root_certs: &[Vec<u8>]) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            connector: configure_ssl(spec, root_certs)?,
            application_settings: spec.application_settings(),
        })
    }

    /// Perform the fingerprinted handshake over an established stream.
    ///
    /// `host` is used for SNI and certificate verification.
    pub async fn handshake(&self, tcp: TcpStream, host: &str) -> Result<MaybeHttpsStream> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let mut config = self
            .connector
            .configure()
            .map_err(|e| Error::tls(format!("failed to configure SSL: {}", e)))?;
        self.add_application_settings(&mut config)?;

        let stream = tokio_boring::connect(config, host, tcp)
            .await
            .map_err(|e| Error::tls(format!("TLS handshake failed: {}", e)))?;

        let stream = MaybeHttpsStream::Https(stream);
        debug!(
            host,
            alpn = ?stream.selected_alpn().map(String::from_utf8_lossy),
            "TLS handshake complete"
        );
        Ok(stream)
    }

    /// ALPS lives on the SSL object, so it is added per connection.
    fn add_application_settings(&self, config: &mut ConnectConfiguration) -> Result<()> {
        for proto in &self.application_settings {
            let rc = unsafe {
                boring_sys::SSL_add_application_settings(
                    config.as_ptr(),
                    proto.as_ptr(),
                    proto.len(),
                    std::ptr::null(),
                    0,
                )
            };
            if rc != 1 {
                return Err(Error::tls(format!(
                    "failed to add application settings for {}",
                    proto
                )));
            }
        }
        Ok(())
    }
}

fn ssl_version(v: TlsVersion) -> SslVersion {
    match v {
        TlsVersion::Tls12 => SslVersion::TLS1_2,
        TlsVersion::Tls13 => SslVersion::TLS1_3,
    }
}

fn configure_ssl(spec: &FingerprintSpec, root_certs: &[Vec<u8>]) -> Result<SslConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())
        .map_err(|e| Error::tls(format!("failed to create SSL connector: {}", e)))?;

    for cert_bytes in root_certs {
        let cert = X509::from_der(cert_bytes)
            .or_else(|_| X509::from_pem(cert_bytes))
            .map_err(|e| Error::configuration(format!("invalid root certificate: {}", e)))?;
        builder
            .cert_store_mut()
            .add_cert(cert)
            .map_err(|e| Error::configuration(format!("failed to add root certificate: {}", e)))?;
    }

    let ciphers = spec.cipher_list()?;
    if !ciphers.is_empty() {
        builder
            .set_cipher_list(&ciphers)
            .map_err(|e| Error::tls(format!("failed to set cipher list: {}", e)))?;
    }

    let curves = spec.curves_list()?;
    if !curves.is_empty() {
        builder
            .set_curves_list(&curves)
            .map_err(|e| Error::tls(format!("failed to set curves: {}", e)))?;
    }

    let sigalgs = spec.sigalgs_list()?;
    if !sigalgs.is_empty() {
        builder
            .set_sigalgs_list(&sigalgs)
            .map_err(|e| Error::tls(format!("failed to set signature algorithms: {}", e)))?;
    }

    if !spec.has_extension(EXT_SESSION_TICKET) {
        builder.set_options(SslOptions::NO_TICKET);
    }

    unsafe {
        let ctx = builder.as_ptr();
        SSL_CTX_set_grease_enabled(ctx, c_int::from(spec.uses_grease()));
        // Fixed order: the hello must be identical across connections.
        SSL_CTX_set_permute_extensions(ctx, 0);

        if spec.has_extension(EXT_STATUS_REQUEST) {
            boring_sys::SSL_CTX_enable_ocsp_stapling(ctx);
        }
        if spec.has_extension(EXT_SIGNED_CERT_TIMESTAMP) {
            boring_sys::SSL_CTX_enable_signed_cert_timestamps(ctx);
        }

        // Client only decompresses; no compression callback.
        for alg in spec.cert_compression() {
            match alg {
                CertCompression::Brotli => {
                    let rc = boring_sys::SSL_CTX_add_cert_compression_alg(
                        ctx,
                        alg.id(),
                        None,
                        Some(decompress_brotli_cert),
                    );
                    if rc != 1 {
                        return Err(Error::tls("failed to enable brotli certificate compression"));
                    }
                }
            }
        }
    }

    builder
        .set_min_proto_version(Some(ssl_version(spec.min_version())))
        .map_err(|e| Error::tls(format!("failed to set min TLS version: {}", e)))?;
    builder
        .set_max_proto_version(Some(ssl_version(spec.max_version())))
        .map_err(|e| Error::tls(format!("failed to set max TLS version: {}", e)))?;

    // Session tickets and IDs are cached like a browser would.
    builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);

    let alpn = spec.alpn_wire();
    if !alpn.is_empty() {
        builder
            .set_alpn_protos(&alpn)
            .map_err(|e| Error::tls(format!("failed to set ALPN: {}", e)))?;
    }

    Ok(builder.build())
}

/// Stream that can be either plain TCP or TLS.
#[derive(Debug)]
pub enum MaybeHttpsStream {
    /// Plain TCP stream for HTTP.
    Http(TcpStream),
    /// TLS-wrapped stream for HTTPS.
    Https(SslStream<TcpStream>),
}

impl MaybeHttpsStream {
    /// Raw ALPN identifier chosen by the server, if any.
    pub fn selected_alpn(&self) -> Option<&[u8]> {
        match self {
            MaybeHttpsStream::Http(_) => None,
            MaybeHttpsStream::Https(stream) => stream.ssl().selected_alpn_protocol(),
        }
    }

    /// Protocol to speak on this stream.
    ///
    /// Plain TCP has no ALPN and is always HTTP/1.1.
    pub fn negotiated_protocol(&self) -> Result<NegotiatedProtocol> {
        NegotiatedProtocol::from_alpn(self.selected_alpn())
    }
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_flush(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
