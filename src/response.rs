//! HTTP response with a streaming body.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, StatusCode, Version};

use crate::error::{Error, Result};

type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Readable response body.
///
/// Both the HTTP/1.1 reader and the HTTP/2 session feed the same stream
/// interface, so consumers never branch on the negotiated protocol.
pub struct Body {
    inner: BodyStream,
    read_idle: Option<Duration>,
}

impl Body {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
            read_idle: None,
        }
    }

    pub fn empty() -> Self {
        Self::from_stream(futures_util::stream::empty())
    }

    /// Fail a read that waits longer than `idle` for the next chunk.
    pub fn with_read_idle(mut self, idle: Option<Duration>) -> Self {
        self.read_idle = idle;
        self
    }

    /// Next chunk of body data; `Ok(None)` at end of stream.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        let next = match self.read_idle {
            Some(idle) => tokio::time::timeout(idle, self.inner.next())
                .await
                .map_err(|_| Error::ReadIdleTimeout(idle))?,
            None => self.inner.next().await,
        };
        next.transpose()
    }

    /// Read the remaining body into memory.
    pub async fn collect(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("read_idle", &self.read_idle)
            .finish_non_exhaustive()
    }
}

/// Response to one round trip.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    content_length: Option<u64>,
    body: Body,
}

impl Response {
    /// Build a response; content length is taken from the headers.
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap, body: Body) -> Self {
        let content_length = headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        Self {
            status,
            version,
            headers,
            content_length,
            body,
        }
    }

    /// Override the content length (HTTP/2 frames may carry it without a header).
    pub fn with_content_length(mut self, len: Option<u64>) -> Self {
        if self.content_length.is_none() {
            self.content_length = len;
        }
        self
    }

    /// Replace the declared length outright; the framing decides it, not the header.
    pub(crate) fn with_framed_length(mut self, len: Option<u64>) -> Self {
        self.content_length = len;
        self
    }

    /// Bound the wait for each body chunk.
    pub fn with_read_idle(mut self, idle: Option<Duration>) -> Self {
        self.body.read_idle = idle;
        self
    }

    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn http_version(&self) -> &'static str {
        match self.version {
            Version::HTTP_2 => "HTTP/2",
            Version::HTTP_10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Declared body length, if the server sent one.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Whole body as text (invalid UTF-8 replaced).
    pub async fn text(self) -> Result<String> {
        let bytes = self.body.collect().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
