pub mod cli;
pub mod crypto;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod job;
pub mod key;
pub mod merger;
pub mod playlist;
pub mod progress;
pub mod resolver;

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::cli::{read_batch, Args, BatchEntry};
use crate::downloader::default_workers;
use crate::http::{build_http_client, HttpTransport, Transport};
use crate::job::{run_job, DownloadJob, JobOptions, JobOutcome};
use crate::progress::BarProgress;

pub use crate::error::Error;

/// 运行M3U8下载器的主要逻辑
pub async fn run(args: Args) -> Result<()> {
    let client = build_http_client(&args.headers, Duration::from_secs(args.timeout))?;
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(client));

    let options = JobOptions {
        workers: args.threads.unwrap_or_else(default_workers),
        temp_root: args.temp_dir.clone(),
        extension: args.ext.clone(),
        variant_base: args
            .variant_base
            .as_deref()
            .map(Url::parse)
            .transpose()
            .context("Invalid --variant-base")?,
        max_variant_depth: args.max_variant_depth,
        keep_segments: args.keep_segments,
    };

    let entries = match (&args.batch, &args.url) {
        (Some(path), _) => read_batch(path)
            .await
            .with_context(|| format!("Failed to read batch file {:?}", path))?,
        (None, Some(url)) => vec![BatchEntry {
            name: args.name.clone(),
            url: url.clone(),
        }],
        (None, None) => anyhow::bail!("Either --url or --batch is required"),
    };

    let mut failures = 0;
    for entry in &entries {
        let root_manifest_url = match Url::parse(&entry.url) {
            Ok(url) => url,
            Err(e) => {
                failures += 1;
                error!("{}: {}", entry.name, Error::InvalidUrl(entry.url.clone(), e));
                continue;
            }
        };
        let job = DownloadJob {
            root_manifest_url,
            destination_name: entry.name.clone(),
            output_dir: args.output_dir.clone(),
            skip_if_exists: args.skip_existing,
        };
        info!("Downloading {} from {}", job.destination_name, job.root_manifest_url);

        match run_job(transport.clone(), &job, &options, Arc::new(BarProgress::new())).await {
            Ok(JobOutcome::Skipped { output }) => {
                info!("{:?} already exists, skipped.", output)
            }
            Ok(JobOutcome::Completed { output, segments }) => {
                info!("Successfully merged {} segments into {:?}", segments, output)
            }
            Ok(JobOutcome::NeedsAttention { segments_dir, failed }) => {
                failures += 1;
                warn!(
                    "{}: {} segments failed. Download them manually into {:?} and run again to merge:",
                    job.destination_name,
                    failed.len(),
                    segments_dir
                );
                for segment in &failed {
                    warn!("  segment {} URL: {}", segment.index, segment.url);
                }
            }
            Err(e) => {
                failures += 1;
                error!("{}: {}", job.destination_name, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} jobs did not complete.", failures, entries.len());
    }

    Ok(())
}
