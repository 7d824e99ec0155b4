//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use cf_downloader::Config;

/// Download a file through an HTTP proxy with a Chrome TLS fingerprint.
#[derive(Parser, Debug)]
#[command(name = "cf-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Target URL to download
    #[arg(short = 'u', long)]
    pub url: String,

    /// Proxy URL, e.g. http://127.0.0.1:7890 (required for https targets)
    #[arg(short = 'p', long)]
    pub proxy: Option<String>,

    /// Number of concurrent downloads (accepted; downloads run sequentially)
    #[arg(short = 'c', long, default_value_t = 5)]
    pub concurrency: usize,

    /// Output directory for downloaded files
    #[arg(short = 'o', long, default_value = "downloads")]
    pub output: PathBuf,

    /// Maximum number of download attempts
    #[arg(short = 'r', long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: u32,

    /// Delay between attempts in seconds
    #[arg(short = 'd', long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Custom header in key=value form (repeatable); replaces the default headers
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Offer only http/1.1 in the TLS handshake
    #[arg(long)]
    pub http1_only: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn into_config(self) -> Config {
        Config {
            url: self.url,
            proxy_url: self.proxy.filter(|p| !p.is_empty()),
            concurrency: self.concurrency,
            output_dir: self.output,
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay),
            headers: self.headers,
            http2: !self.http1_only,
            ..Config::default()
        }
    }
}
