//! Thin command-line front end for the download engine. Parses arguments,
//! wires the engine's callbacks to an `indicatif` progress bar and status
//! lines, and drives a single download to completion.

mod util;

use clap::Parser;
use engine::DownloadEngine;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use util::{format_bytes, get_default_filename, is_valid_url};

/// TurboGet - multi-threaded accelerated file downloader.
#[derive(Parser, Debug)]
#[command(name = "turbo-get", version, about)]
struct Args {
    /// URL of the file to download.
    url: String,

    /// Destination path. Defaults to the URL's last path segment.
    output: Option<PathBuf>,

    /// Number of concurrent workers.
    #[arg(short = 't', long = "threads", default_value_t = 16)]
    threads: u32,

    /// Speed limit in kilobytes/sec. Unlimited if unset.
    #[arg(short = 's', long = "speed-limit")]
    speed_limit: Option<f64>,

    /// Additional mirror URLs to fall back to when a chunk exhausts retries.
    #[arg(short = 'm', long = "mirror")]
    mirrors: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if !is_valid_url(&args.url) {
        eprintln!("Error: '{}' is not a valid URL", args.url);
        std::process::exit(1);
    }

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(get_default_filename(&args.url)));

    let engine = match DownloadEngine::new(args.url.clone(), output.clone(), args.threads) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if !args.mirrors.is_empty() {
        engine.set_mirrors(args.mirrors);
    }
    if let Some(limit) = args.speed_limit {
        engine.set_speed_limit(Some(limit));
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let progress_bar = bar.clone();
    engine.on_progress(move |downloaded, total| {
        if total > 0 && progress_bar.length() != Some(total) {
            progress_bar.set_length(total);
        }
        progress_bar.set_position(downloaded);
    });

    let speed_bar = bar.clone();
    engine.on_speed(move |current, average| {
        speed_bar.set_message(format!(
            "{}/s (avg {}/s)",
            format_bytes(current),
            format_bytes(average)
        ));
    });

    engine.on_status(|message| {
        tracing::info!("{message}");
    });

    register_ctrlc(engine.clone());

    engine.download().await;
    bar.finish_and_clear();

    println!("Saved to {}", output.display());
}

/// Installs a Ctrl-C handler that calls `stop()` instead of aborting the
/// process outright, so an interrupted download leaves a resumable sidecar.
fn register_ctrlc(engine: Arc<DownloadEngine>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine.stop();
        }
    });
}
