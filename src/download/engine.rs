//! Resumable, retrying file download.
//!
//! Each attempt probes the destination file, asks for the missing byte range
//! and streams the body to disk in 32 KiB writes. The file on disk is the only
//! resume state: after any failure it holds exactly the bytes that were
//! confirmed written, so the next attempt can trust its size.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, RANGE};
use http::{Method, Request, StatusCode, Uri};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::download::progress::{NoopReporter, ProgressHandle, ProgressReporter};
use crate::download::retry::RetryPolicy;
use crate::error::{Error, Result};
use crate::headers::to_header_map;
use crate::response::Response;
use crate::transport::RoundTrip;

/// Largest single file write and progress increment.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// How a download finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Body streamed to end of file.
    Completed {
        attempts: u32,
        resumed_from: u64,
        bytes_written: u64,
    },
    /// Server answered 416: nothing left to fetch.
    AlreadyComplete { attempts: u32 },
}

impl DownloadOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Completed { attempts, .. } | Self::AlreadyComplete { attempts } => *attempts,
        }
    }
}

/// Mutable record of one attempt.
#[derive(Debug, Default)]
struct DownloadState {
    attempt: u32,
    resume_offset: u64,
    total_size: u64,
    written: u64,
}

/// Why an attempt stopped short.
enum Failure {
    /// Another attempt may succeed.
    Retry(Error),
    /// No attempt can succeed; surface as-is.
    Abort(Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        if e.is_retryable() {
            Failure::Retry(e)
        } else {
            Failure::Abort(e)
        }
    }
}

type AttemptResult = std::result::Result<DownloadOutcome, Failure>;

/// Drives downloads over any [`RoundTrip`] transport.
pub struct DownloadEngine<T> {
    transport: T,
    policy: RetryPolicy,
    headers: HeaderMap,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl<T: RoundTrip> DownloadEngine<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            headers: HeaderMap::new(),
            reporter: Arc::new(NoopReporter),
            cancel: CancellationToken::new(),
        }
    }

    /// Headers sent on every attempt (the resolved set, not merged later).
    pub fn with_headers(mut self, headers: &[(String, String)]) -> Result<Self> {
        self.headers = to_header_map(headers)?;
        Ok(self)
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Stop the download when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Download `url` into `path`, resuming from whatever `path` already holds.
    pub async fn download(&self, url: &str, path: &Path) -> Result<DownloadOutcome> {
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::configuration(format!("invalid URL {:?}: {}", url, e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let max = self.policy.max_attempts();
        let mut last_error = None;

        for attempt in 0..max {
            if let Some(delay) = self.policy.delay_before(attempt) {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut state = DownloadState {
                attempt: attempt + 1,
                ..DownloadState::default()
            };
            match self.attempt(&uri, path, &name, &mut state).await {
                Ok(outcome) => {
                    info!(file = %name, attempts = state.attempt, "download finished");
                    return Ok(outcome);
                }
                Err(Failure::Abort(e)) => return Err(e),
                Err(Failure::Retry(e)) => {
                    warn!(
                        file = %name,
                        attempt = state.attempt,
                        max_attempts = max,
                        error = %e,
                        "download attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| Error::configuration("no attempt was made"));
        Err(Error::download(max, last))
    }

    async fn attempt(
        &self,
        uri: &Uri,
        path: &Path,
        name: &str,
        state: &mut DownloadState,
    ) -> AttemptResult {
        // Probing: the file on disk is the resume offset.
        state.resume_offset = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let request = self.build_request(uri, state.resume_offset)?;
        debug!(file = %name, offset = state.resume_offset, attempt = state.attempt, "requesting");

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Failure::Abort(Error::Cancelled)),
            r = self.transport.round_trip(request) => r?,
        };

        match response.status_code() {
            StatusCode::OK => state.resume_offset = 0,
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::RANGE_NOT_SATISFIABLE => {
                return Ok(DownloadOutcome::AlreadyComplete {
                    attempts: state.attempt,
                })
            }
            other => {
                return Err(Failure::Retry(Error::http_status(
                    other.as_u16(),
                    other.canonical_reason().unwrap_or("unexpected status"),
                )))
            }
        }

        let content_length = match response.content_length() {
            Some(len) if len > 0 => len,
            other => return Err(Failure::Retry(Error::InvalidContentLength(other))),
        };
        state.total_size = state.resume_offset + content_length;

        // Opening the destination is not retried; a bad path stays bad.
        let file = open_destination(path, state.resume_offset)
            .await
            .map_err(|e| Failure::Abort(Error::Io(e)))?;

        let mut progress = self
            .reporter
            .create(name, state.total_size, state.resume_offset);
        match self.stream_body(response, file, state, progress.as_mut()).await {
            Ok(()) => {
                progress.success();
                Ok(DownloadOutcome::Completed {
                    attempts: state.attempt,
                    resumed_from: state.resume_offset,
                    bytes_written: state.written,
                })
            }
            Err(e) => {
                progress.fail(&e);
                Err(e.into())
            }
        }
    }

    fn build_request(&self, uri: &Uri, offset: u64) -> Result<Request<()>> {
        let mut request = Request::builder()
            .method(Method::GET)
            .uri(uri.clone())
            .body(())
            .map_err(|e| Error::configuration(format!("invalid request: {}", e)))?;
        *request.headers_mut() = self.headers.clone();
        if offset > 0 {
            let range = HeaderValue::from_str(&format!("bytes={}-", offset))
                .map_err(|e| Error::configuration(e.to_string()))?;
            request.headers_mut().insert(RANGE, range);
        }
        Ok(request)
    }

    async fn stream_body(
        &self,
        response: Response,
        mut file: File,
        state: &mut DownloadState,
        progress: &mut dyn ProgressHandle,
    ) -> Result<()> {
        let mut body = response.into_body();
        loop {
            let chunk: Option<Bytes> = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                c = body.chunk() => c?,
            };
            let Some(chunk) = chunk else {
                let expected = state.total_size - state.resume_offset;
                if state.written != expected {
                    return Err(Error::connection(format!(
                        "body ended after {} of {} bytes",
                        state.written, expected
                    )));
                }
                return Ok(());
            };

            for piece in chunk.chunks(CHUNK_SIZE) {
                if let Err(e) = write_piece(&mut file, piece).await {
                    // Drop any partial write so the file size stays trustworthy.
                    let confirmed = state.resume_offset + state.written;
                    if let Err(trunc) = file.set_len(confirmed).await {
                        warn!(error = %trunc, confirmed, "failed to truncate after write error");
                    }
                    return Err(Error::Io(e));
                }
                state.written += piece.len() as u64;
                progress.update(piece.len() as u64);
            }
        }
    }
}

async fn write_piece(file: &mut File, piece: &[u8]) -> std::io::Result<()> {
    file.write_all(piece).await?;
    // tokio defers write errors to the next operation; surface them now.
    file.flush().await
}

/// Append when resuming, otherwise start the file over.
async fn open_destination(path: &Path, offset: u64) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if offset > 0 {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(path).await
}
