//! HTTP/2 transport via hyper's client connection.

use bytes::Bytes;
use futures_util::StreamExt;
use http::Request;
use http_body_util::{BodyStream, Empty};
use hyper::body::Body as _;
use hyper::client::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{Error, Result};
use crate::response::{Body, Response};

/// Chrome's advertised stream window (SETTINGS_INITIAL_WINDOW_SIZE).
const INITIAL_STREAM_WINDOW: u32 = 6 * 1024 * 1024;

/// Chrome's connection window after its initial WINDOW_UPDATE.
const INITIAL_CONNECTION_WINDOW: u32 = 15 * 1024 * 1024;

/// Chrome's SETTINGS_MAX_HEADER_LIST_SIZE.
const MAX_HEADER_LIST_SIZE: u32 = 256 * 1024;

/// Run one request on a fresh HTTP/2 session over `stream`.
///
/// The request URI must be absolute; hyper derives `:scheme` and
/// `:authority` from it.
pub async fn send_request<S>(stream: S, request: Request<()>) -> Result<Response>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = http2::Builder::new(TokioExecutor::new())
        .initial_stream_window_size(INITIAL_STREAM_WINDOW)
        .initial_connection_window_size(INITIAL_CONNECTION_WINDOW)
        .max_header_list_size(MAX_HEADER_LIST_SIZE)
        .handshake(TokioIo::new(stream))
        .await
        .map_err(|e| Error::http_protocol(format!("HTTP/2 handshake failed: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("HTTP/2 connection closed: {}", e);
        }
    });

    let (parts, ()) = request.into_parts();
    let request = hyper::Request::from_parts(parts, Empty::<Bytes>::new());

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| Error::http_protocol(format!("HTTP/2 request failed: {}", e)))?;

    let (parts, incoming) = response.into_parts();
    let frame_length = incoming.size_hint().exact();

    let data = BodyStream::new(incoming).filter_map(|frame| async move {
        match frame {
            // Trailers and other non-data frames are dropped.
            Ok(frame) => frame.into_data().ok().map(Ok),
            Err(e) => Some(Err(Error::connection(format!(
                "HTTP/2 body error: {}",
                e
            )))),
        }
    });
    // Session stays open while the body is alive.
    let data = data.map(move |item| {
        let _ = &sender;
        item
    });

    Ok(Response::new(
        parts.status,
        http::Version::HTTP_2,
        parts.headers,
        Body::from_stream(data),
    )
    .with_content_length(frame_length))
}
