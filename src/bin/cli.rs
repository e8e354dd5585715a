// src/bin/cli.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `upload` and `abort`.
//!
//! Examples:
//! ```bash
//! s3-upload upload ./big.bin s3://bucket/data/big.bin -j 8
//! s3-upload upload ./big.bin s3://bucket/data/           # key = data/big.bin
//! s3-upload abort  s3://bucket/data/big.bin <UPLOAD_ID>   # release an orphaned session
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use s3mpu::constants::PROGRESS_REFRESH_INTERVAL;
use s3mpu::{
    BoundedRetry, Decision, FileSource, FixedDecision, MultipartStore, PartialFailureHandler,
    PartialFailureReport, S3Store, UploadConfig, UploadError, UploadMode, UploadProgressBar,
    UploadSource, Uploader, object_uri_for_file, parse_s3_uri,
};

#[derive(Clone, Debug)]
struct S3Path {
    bucket: String,
    key: String,
}

impl FromStr for S3Path {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bucket, key) = parse_s3_uri(s)?;
        Ok(S3Path { bucket, key })
    }
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a local file. Files at or above the threshold use a concurrent
    /// multipart upload through pre-signed part URLs.
    Upload {
        /// Local file to upload.
        file: PathBuf,

        /// Destination, e.g. s3://bucket/key or s3://bucket/prefix/
        dest: String,

        /// Part size in bytes (minimum 5 MiB).
        #[arg(long)]
        part_size: Option<u64>,

        /// Number of concurrent part uploads.
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Retries per part after the first attempt.
        #[arg(long)]
        max_retries: Option<u32>,

        /// Linear backoff unit between attempts, e.g. 500ms, 2s.
        #[arg(long, value_parser = humantime::parse_duration)]
        retry_delay: Option<Duration>,

        /// Files smaller than this many bytes use a single PUT.
        #[arg(long)]
        threshold: Option<u64>,

        /// Content-Type of the stored object.
        #[arg(long)]
        content_type: Option<String>,

        /// Create the bucket if it does not exist.
        #[arg(long)]
        create_bucket: bool,

        /// Region used when creating the bucket.
        #[arg(long)]
        region: Option<String>,

        /// Retry failed parts without asking, for up to N rounds, then abort.
        #[arg(long, value_name = "N", conflicts_with = "no_retry")]
        auto_retry: Option<u32>,

        /// Abort on failed parts without asking.
        #[arg(long)]
        no_retry: bool,
    },

    /// Abort an orphaned multipart upload session.
    Abort {
        #[clap(value_parser)]
        s3_path: S3Path,

        /// Upload id printed by a failed completion.
        upload_id: String,
    },
}

/// Asks on the terminal whether failed parts should be retried.
struct PromptDecision {
    bar: UploadProgressBar,
}

impl PartialFailureHandler for PromptDecision {
    fn on_partial_failure(&self, report: &PartialFailureReport) -> Decision {
        let _paused = self.bar.pause();
        prompt(report)
    }
}

fn prompt(report: &PartialFailureReport) -> Decision {
    let mut stderr = io::stderr();
    let _ = writeln!(
        stderr,
        "\n{} of {} parts uploaded, {} failed.",
        report.completed, report.total, report.failed
    );
    for (part, err) in &report.errors {
        let _ = writeln!(stderr, "  part {}: {}", part, err);
    }

    let stdin = io::stdin();
    loop {
        let _ = write!(stderr, "Retry failed parts? [retry/abort]: ");
        let _ = stderr.flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return Decision::Abort,
            Ok(_) => {}
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "retry" | "y" | "yes" => return Decision::Retry,
            "a" | "abort" | "n" | "no" => return Decision::Abort,
            _ => continue,
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
    tracing_log::LogTracer::init().ok();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the tokio runtime")?;
    let result = rt.block_on(run(cli.cmd));
    // A retry/abort prompt can still be blocked on stdin after Ctrl-C; the
    // session is already aborted, so do not wait for it.
    rt.shutdown_background();
    result
}

async fn run(cmd: Command) -> Result<()> {
    match cmd {
        Command::Upload {
            file,
            dest,
            part_size,
            concurrency,
            max_retries,
            retry_delay,
            threshold,
            content_type,
            create_bucket,
            region,
            auto_retry,
            no_retry,
        } => {
            let mut config = UploadConfig::from_env();
            if let Some(v) = part_size {
                config = config.with_part_size(v);
            }
            if let Some(v) = concurrency {
                config = config.with_concurrency(v);
            }
            if let Some(v) = max_retries {
                config = config.with_max_retries(v);
            }
            if let Some(v) = retry_delay {
                config = config.with_retry_base_delay(v);
            }
            if let Some(v) = threshold {
                config = config.with_multipart_threshold(v);
            }
            if content_type.is_some() {
                config.content_type = content_type;
            }

            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("source path has no file name")?;
            let (bucket, key) = object_uri_for_file(&dest, &file_name)?;
            let source = FileSource::open(&file)
                .await
                .with_context(|| format!("cannot open {}", file.display()))?;

            let bar = UploadProgressBar::new("UPLOAD", source.size());
            let handler: Arc<dyn PartialFailureHandler> = if let Some(rounds) = auto_retry {
                Arc::new(BoundedRetry::new(rounds))
            } else if no_retry {
                Arc::new(FixedDecision(Decision::Abort))
            } else {
                Arc::new(PromptDecision { bar: bar.clone() })
            };

            let uploader = Uploader::from_env(config, handler).await?;
            uploader
                .ensure_bucket(&bucket, region.as_deref(), create_bucket)
                .await?;

            let cancel = uploader.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling upload (press Ctrl-C again to exit now)");
                    cancel.cancel();
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });

            let prepared = uploader.prepare(Arc::new(source), &bucket, &key)?;
            if prepared.mode() == UploadMode::Multipart {
                info!("Using multipart upload for s3://{}/{}", bucket, key);
            }
            let progress = prepared.progress();
            let ticker_bar = bar.clone();
            let ticker = tokio::spawn(async move {
                let mut interval = tokio::time::interval(PROGRESS_REFRESH_INTERVAL);
                loop {
                    interval.tick().await;
                    ticker_bar.update(&progress.snapshot());
                }
            });

            let t0 = Instant::now();
            let result = uploader.execute(prepared).await;
            ticker.abort();

            match result {
                Ok(outcome) => {
                    bar.progress_bar.set_position(outcome.total_bytes);
                    bar.finish(outcome.total_bytes, t0.elapsed());
                    println!(
                        "Uploaded s3://{}/{} ({} bytes, {} parts{})",
                        outcome.bucket,
                        outcome.key,
                        outcome.total_bytes,
                        outcome.parts,
                        outcome
                            .e_tag
                            .map(|e| format!(", ETag {}", e))
                            .unwrap_or_default()
                    );
                }
                Err(e) => {
                    bar.abandon("failed");
                    if let UploadError::CompletionFailed { upload_id, .. } = &e {
                        eprintln!(
                            "Run `s3-upload abort s3://{}/{} {}` to release the stored parts.",
                            bucket, key, upload_id
                        );
                    }
                    return Err(e.into());
                }
            }
        }

        Command::Abort { s3_path, upload_id } => {
            let store = S3Store::from_env().await?;
            store
                .abort_multipart_upload(&s3_path.bucket, &s3_path.key, &upload_id)
                .await?;
            println!(
                "Aborted upload {} for s3://{}/{}",
                upload_id, s3_path.bucket, s3_path.key
            );
        }
    }

    Ok(())
}
