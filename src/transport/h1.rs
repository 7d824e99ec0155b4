//! HTTP/1.1 client codec over an arbitrary byte stream.
//!
//! Uses httparse for response parsing and raw I/O for full control over the
//! request line and header order. The response body is exposed as a stream
//! so large downloads never sit in memory.

use bytes::{Buf, Bytes, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, StatusCode, Uri, Version};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::response::{Body, Response};

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// Socket read granularity.
const READ_SIZE: usize = 32 * 1024;

/// Maximum length of a chunk-size line (size plus extensions).
const MAX_CHUNK_LINE: usize = 4096;

/// Request-target form per RFC 9112 Section 3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget {
    /// `/path?query`, sent to the origin.
    Origin,
    /// `http://host/path?query`, sent to a forward proxy.
    Absolute,
    /// `host:port`, used by CONNECT.
    Authority,
}

/// Status line and headers of a response.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

/// HTTP/1.1 connection for a single request/response exchange.
pub struct H1Connection<S> {
    stream: S,
}

impl<S> H1Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a new HTTP/1.1 connection from an existing stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Write `request` and parse the response from the same stream.
    ///
    /// The connection is consumed: the returned body owns the read side.
    pub async fn send_request(
        mut self,
        request: &Request<()>,
        target: RequestTarget,
    ) -> Result<Response> {
        let bytes = build_request(request.method(), request.uri(), request.headers(), target)?;
        self.stream
            .write_all(&bytes)
            .await
            .map_err(|e| Error::connection(format!("failed to write request: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| Error::connection(format!("failed to flush: {}", e)))?;

        let mut buffer = BytesMut::with_capacity(READ_SIZE);
        let head = read_head(&mut self.stream, &mut buffer).await?;
        let framing = body_framing(&head, request.method())?;
        // Content-Length means nothing once Transfer-Encoding is present.
        let declared = match framing {
            Framing::Length(n) => Some(n),
            Framing::Chunked(_) | Framing::Close => None,
        };

        let reader = BodyReader {
            stream: self.stream,
            buf: buffer,
            framing,
            done: false,
        };
        Ok(
            Response::new(head.status, head.version, head.headers, reader.into_body())
                .with_framed_length(declared),
        )
    }
}

/// Serialize a request line plus headers.
pub fn build_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    target: RequestTarget,
) -> Result<Vec<u8>> {
    let mut request = Vec::with_capacity(1024);

    // Request line: METHOD request-target HTTP/1.1\r\n
    request.extend_from_slice(method.as_str().as_bytes());
    request.push(b' ');
    match target {
        RequestTarget::Authority => {
            let host = uri
                .host()
                .ok_or_else(|| Error::http_protocol("CONNECT requires host"))?;
            request.extend_from_slice(host.as_bytes());
            request.push(b':');
            let port = uri.port_u16().unwrap_or(443);
            request.extend_from_slice(port.to_string().as_bytes());
        }
        RequestTarget::Absolute => {
            request.extend_from_slice(uri.to_string().as_bytes());
        }
        RequestTarget::Origin => {
            let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            request.extend_from_slice(path.as_bytes());
        }
    }
    request.extend_from_slice(b" HTTP/1.1\r\n");

    // Host header (required for HTTP/1.1 per RFC 9112 Section 3.2)
    request.extend_from_slice(b"Host: ");
    if let Some(host) = uri.host() {
        request.extend_from_slice(host.as_bytes());
        if let Some(port) = uri.port() {
            request.push(b':');
            request.extend_from_slice(port.as_str().as_bytes());
        }
    }
    request.extend_from_slice(b"\r\n");

    // Caller headers in insertion order
    for (name, value) in headers {
        if name == http::header::HOST {
            continue;
        }
        request.extend_from_slice(name.as_str().as_bytes());
        request.extend_from_slice(b": ");
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
    }

    request.extend_from_slice(b"\r\n");
    Ok(request)
}

/// Read a response head, skipping 1xx interim responses.
///
/// Bytes past the head stay in `buffer`.
pub async fn read_head<S>(stream: &mut S, buffer: &mut BytesMut) -> Result<ResponseHead>
where
    S: AsyncRead + Unpin,
{
    loop {
        let header_end = loop {
            if let Some(end) = find_header_end(buffer) {
                break end;
            }
            if buffer.len() >= MAX_HEADERS_SIZE {
                return Err(Error::http_protocol("response headers too large"));
            }
            buffer.reserve(READ_SIZE);
            let n = stream
                .read_buf(buffer)
                .await
                .map_err(|e| Error::connection(format!("failed to read response: {}", e)))?;
            if n == 0 {
                return Err(Error::connection(
                    "connection closed before response headers complete",
                ));
            }
        };

        let head = parse_head(&buffer[..header_end])?;
        buffer.advance(header_end);

        // RFC 9112 Section 6: interim responses precede the final one.
        if head.status.is_informational() {
            continue;
        }
        return Ok(head);
    }
}

fn parse_head(data: &[u8]) -> Result<ResponseHead> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
    let mut response = httparse::Response::new(&mut headers);

    match response
        .parse(data)
        .map_err(|e| Error::http_protocol(format!("failed to parse response: {}", e)))?
    {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => {
            return Err(Error::http_protocol("incomplete response headers"));
        }
    }

    let code = response
        .code
        .ok_or_else(|| Error::http_protocol("missing status code"))?;
    let status = StatusCode::from_u16(code)
        .map_err(|_| Error::http_protocol(format!("invalid status code {}", code)))?;
    let version = match response.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut map = HeaderMap::with_capacity(response.headers.len());
    for h in response.headers.iter().filter(|h| !h.name.is_empty()) {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|e| Error::http_protocol(format!("invalid header name: {}", e)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|e| Error::http_protocol(format!("invalid header value: {}", e)))?;
        map.append(name, value);
    }

    Ok(ResponseHead {
        status,
        version,
        headers: map,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(u64),
    Chunked(ChunkState),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataCrlf,
    Trailers,
    Done,
}

/// Determine body framing per RFC 9112 Section 6.3.
fn body_framing(head: &ResponseHead, method: &Method) -> Result<Framing> {
    // HEAD responses and 1xx/204/304 carry no body.
    let status = head.status.as_u16();
    if *method == Method::HEAD || matches!(status, 100..=199 | 204 | 304) {
        return Ok(Framing::Length(0));
    }

    let transfer_encoding = header_str(&head.headers, "transfer-encoding");
    if let Some(te) = transfer_encoding {
        // chunked must be the final transfer coding; Content-Length is ignored.
        let chunked = te
            .split(',')
            .next_back()
            .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
        return Ok(if chunked {
            Framing::Chunked(ChunkState::Size)
        } else {
            Framing::Close
        });
    }

    match header_str(&head.headers, "content-length") {
        Some(cl) => Ok(Framing::Length(parse_content_length(cl)?)),
        None => Ok(Framing::Close),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Incremental body decoder owning the read side of the connection.
struct BodyReader<S> {
    stream: S,
    buf: BytesMut,
    framing: Framing,
    done: bool,
}

impl<S> BodyReader<S>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    fn into_body(self) -> Body {
        Body::from_stream(futures_util::stream::unfold(self, |mut reader| async move {
            if reader.done {
                return None;
            }
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), reader)),
                Ok(None) => None,
                Err(e) => {
                    reader.done = true;
                    Some((Err(e), reader))
                }
            }
        }))
    }

    async fn fill(&mut self) -> Result<usize> {
        self.buf.reserve(READ_SIZE);
        self.stream
            .read_buf(&mut self.buf)
            .await
            .map_err(|e| Error::connection(format!("failed to read body: {}", e)))
    }

    /// Take up to `remaining` bytes, reading if the buffer is empty.
    async fn take(&mut self, remaining: u64) -> Result<Bytes> {
        if self.buf.is_empty() && self.fill().await? == 0 {
            return Err(Error::connection(format!(
                "connection closed with {} body bytes outstanding",
                remaining
            )));
        }
        let n = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(self.buf.len());
        Ok(self.buf.split_to(n).freeze())
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.framing {
                Framing::Length(0) => return Ok(None),
                Framing::Length(remaining) => {
                    let chunk = self.take(remaining).await?;
                    self.framing = Framing::Length(remaining - chunk.len() as u64);
                    return Ok(Some(chunk));
                }
                Framing::Close => {
                    if self.buf.is_empty() && self.fill().await? == 0 {
                        return Ok(None);
                    }
                    return Ok(Some(self.buf.split().freeze()));
                }
                Framing::Chunked(ChunkState::Size) => match parse_chunk_size(&self.buf)? {
                    Some((size, line_end)) => {
                        self.buf.advance(line_end);
                        self.framing = Framing::Chunked(if size == 0 {
                            ChunkState::Trailers
                        } else {
                            ChunkState::Data(size)
                        });
                    }
                    None => {
                        if self.buf.len() > MAX_CHUNK_LINE {
                            return Err(Error::http_protocol("chunk size line too long"));
                        }
                        if self.fill().await? == 0 {
                            return Err(Error::connection(
                                "connection closed while reading chunk size",
                            ));
                        }
                    }
                },
                Framing::Chunked(ChunkState::Data(0)) => {
                    self.framing = Framing::Chunked(ChunkState::DataCrlf);
                }
                Framing::Chunked(ChunkState::Data(remaining)) => {
                    let chunk = self.take(remaining).await?;
                    self.framing =
                        Framing::Chunked(ChunkState::Data(remaining - chunk.len() as u64));
                    return Ok(Some(chunk));
                }
                Framing::Chunked(ChunkState::DataCrlf) => {
                    while self.buf.len() < 2 {
                        if self.fill().await? == 0 {
                            return Err(Error::connection(
                                "connection closed while reading chunk data",
                            ));
                        }
                    }
                    if &self.buf[..2] != b"\r\n" {
                        return Err(Error::http_protocol("missing CRLF after chunk data"));
                    }
                    self.buf.advance(2);
                    self.framing = Framing::Chunked(ChunkState::Size);
                }
                Framing::Chunked(ChunkState::Trailers) => match find_crlf(&self.buf) {
                    // Empty line ends the trailer section.
                    Some(0) => {
                        self.buf.advance(2);
                        self.framing = Framing::Chunked(ChunkState::Done);
                    }
                    Some(pos) => self.buf.advance(pos + 2),
                    None => {
                        if self.fill().await? == 0 {
                            self.framing = Framing::Chunked(ChunkState::Done);
                        }
                    }
                },
                Framing::Chunked(ChunkState::Done) => return Ok(None),
            }
        }
    }
}

/// Find the end of HTTP headers (\r\n\r\n).
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
}

/// Find the first CRLF in a buffer, returning its position.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

/// Parse a chunk-size line, returning (size, end_of_line_position).
///
/// `Ok(None)` means the line is not complete yet.
fn parse_chunk_size(buffer: &[u8]) -> Result<Option<(u64, usize)>> {
    let Some(pos) = find_crlf(buffer) else {
        return Ok(None);
    };
    let line = String::from_utf8_lossy(&buffer[..pos]);
    // Chunk extensions after ';' are ignored.
    let size_part = line.split(';').next().unwrap_or("").trim();
    let size = u64::from_str_radix(size_part, 16)
        .map_err(|_| Error::http_protocol(format!("invalid chunk size {:?}", size_part)))?;
    Ok(Some((size, pos + 2)))
}

/// Parse and validate Content-Length header value per RFC 9112 Section 6.2.
///
/// If multiple values are present (comma-separated), they must all be identical.
fn parse_content_length(value: &str) -> Result<u64> {
    let mut parts = value.split(',').map(|s| s.trim());
    let first = parts
        .next()
        .and_then(|p| p.parse::<u64>().ok())
        .ok_or_else(|| Error::http_protocol(format!("invalid Content-Length: {}", value)))?;

    for part in parts {
        let val = part
            .parse::<u64>()
            .map_err(|_| Error::http_protocol(format!("invalid Content-Length: {}", value)))?;
        if val != first {
            return Err(Error::http_protocol(format!(
                "conflicting Content-Length values: {}",
                value
            )));
        }
    }

    Ok(first)
}
