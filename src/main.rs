//! CLI entry point for cf-downloader.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => {
            println!("Download completed successfully!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Download error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    debug!(?args, "CLI arguments parsed");
    let mut config = args.into_config();

    config
        .prepare_output_dir()
        .context("preparing output directory")?;
    if config.concurrency != 1 {
        debug!(
            concurrency = config.concurrency,
            "concurrency is accepted but downloads run sequentially"
        );
    }

    let cancel = CancellationToken::new();
    let client = config
        .client_builder()?
        .cancellation(cancel.clone())
        .build()
        .context("building client")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping download");
            cancel.cancel();
        }
    });

    let output = config.output_path();
    println!("Downloading {} to {}", config.url, output.display());
    info!(url = %config.url, output = %output.display(), "starting download");

    client
        .download_file(&config.url, &output, config.request_options().as_ref())
        .await?;
    Ok(())
}
