//! Run configuration for the downloader.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::client::{Client, ClientBuilder};
use crate::download::RetryPolicy;
use crate::error::{Error, Result};
use crate::headers::RequestOptions;
use crate::timeouts::Timeouts;

/// File name used when the URL path has no usable last segment.
pub const FALLBACK_FILE_NAME: &str = "downloaded_file";

/// All inputs of one download run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target URL.
    pub url: String,
    /// Upstream HTTP proxy; required for `https` targets.
    pub proxy_url: Option<String>,
    /// Accepted for compatibility; downloads run one at a time.
    pub concurrency: usize,
    pub output_dir: PathBuf,
    /// Total attempts per download, including the first.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Custom headers as `key=value`; when any parse they replace the defaults.
    pub headers: Vec<String>,
    /// Offer HTTP/2 through ALPN.
    pub http2: bool,
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: String::new(),
            proxy_url: None,
            concurrency: 5,
            output_dir: PathBuf::from("downloads"),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            headers: Vec::new(),
            http2: true,
            timeouts: Timeouts::download_defaults(),
        }
    }
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parse `key=value` headers. Entries without `=` are skipped; an empty
    /// result means "use the client's defaults".
    pub fn request_options(&self) -> Option<RequestOptions> {
        let headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        if headers.is_empty() {
            None
        } else {
            Some(RequestOptions {
                headers: Some(headers),
            })
        }
    }

    /// Last path segment of the URL, or [`FALLBACK_FILE_NAME`].
    pub fn file_name(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty() && name != "." && name != "..")
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
    }

    /// `<output_dir>/<file name>`.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.file_name())
    }

    /// Make `output_dir` absolute and create it.
    pub fn prepare_output_dir(&mut self) -> Result<&Path> {
        if self.output_dir.as_os_str().is_empty() {
            self.output_dir = PathBuf::from("downloads");
        }
        if self.output_dir.is_relative() {
            self.output_dir = std::env::current_dir()?.join(&self.output_dir);
        }
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            Error::configuration(format!(
                "failed to create output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;
        Ok(&self.output_dir)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Client builder carrying these settings.
    pub fn client_builder(&self) -> Result<ClientBuilder> {
        let mut builder = Client::builder()
            .retry_policy(self.retry_policy()?)
            .timeouts(self.timeouts.clone())
            .http2(self.http2);
        if let Some(proxy) = &self.proxy_url {
            builder = builder.proxy(proxy.clone());
        }
        Ok(builder)
    }
}
