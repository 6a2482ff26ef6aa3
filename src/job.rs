use log::{error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use url::Url;

use crate::downloader::{default_workers, download_segments, BatchStatus, FailedSegment};
use crate::error::Result;
use crate::fetcher::{segment_file_name, SegmentKey, SegmentTask};
use crate::http::Transport;
use crate::key::KeyResolver;
use crate::merger::{cleanup_segments, merge_segments};
use crate::playlist::{manifest_base, KeyDescriptor};
use crate::progress::ProgressObserver;
use crate::resolver::{ManifestResolver, DEFAULT_MAX_VARIANT_DEPTH};

/// 一次下载并合并的任务
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub root_manifest_url: Url,
    pub destination_name: String,
    pub output_dir: PathBuf,
    pub skip_if_exists: bool,
}

/// 与具体任务无关的运行参数
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub workers: usize,
    /// 临时分段目录的根目录
    pub temp_root: PathBuf,
    pub extension: String,
    pub variant_base: Option<Url>,
    pub max_variant_depth: usize,
    pub keep_segments: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            temp_root: PathBuf::from("ts_temp"),
            extension: "ts".to_string(),
            variant_base: None,
            max_variant_depth: DEFAULT_MAX_VARIANT_DEPTH,
            keep_segments: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// 最终文件已存在，未做任何请求
    Skipped { output: PathBuf },
    Completed { output: PathBuf, segments: usize },
    /// 部分分段失败，未合并；分段保留在 `segments_dir` 以便手动补齐后重跑
    NeedsAttention {
        segments_dir: PathBuf,
        failed: Vec<FailedSegment>,
    },
}

impl DownloadJob {
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.destination_name, extension))
    }

    /// 同一输出目录与名称总是得到同一个临时目录，重跑时可复用已下载分段
    pub fn segments_dir(&self, temp_root: &Path) -> PathBuf {
        let identity = format!("{}\n{}", self.output_dir.display(), self.destination_name);
        temp_root.join(&sha256::digest(&identity)[..12])
    }
}

/// 执行下载任务：解析播放列表 → 获取密钥 → 并发下载 → 按序合并
pub async fn run_job(
    transport: Arc<dyn Transport>,
    job: &DownloadJob,
    options: &JobOptions,
    observer: Arc<dyn ProgressObserver>,
) -> Result<JobOutcome> {
    let output = job.output_path(&options.extension);
    if job.skip_if_exists && fs::try_exists(&output).await? {
        info!("{:?} already exists, skipping download.", output);
        return Ok(JobOutcome::Skipped { output });
    }

    let resolved = ManifestResolver::new(transport.clone())
        .with_variant_base(options.variant_base.clone())
        .with_max_depth(options.max_variant_depth)
        .resolve_playlist(&job.root_manifest_url)
        .await?;
    let segments = resolved.document.segments();
    info!(
        "Successfully parsed media playlist. Found {} segments.",
        segments.len()
    );

    let referer = manifest_base(&resolved.url);
    let keys = resolve_keys(
        transport.clone(),
        &referer,
        segments.iter().filter_map(|s| s.key.as_ref()),
    )
    .await?;

    let segments_dir = job.segments_dir(&options.temp_root);
    info!("Segments will be saved to: {:?}", segments_dir);
    fs::create_dir_all(&segments_dir).await?;
    fs::create_dir_all(&job.output_dir).await?;

    let tasks: Vec<SegmentTask> = segments
        .iter()
        .map(|segment| SegmentTask {
            index: segment.index,
            url: segment.uri.clone(),
            dest: segments_dir.join(segment_file_name(segment.index)),
            key: segment.key.as_ref().and_then(|k| {
                keys.get(&k.uri).map(|bytes| SegmentKey {
                    key: bytes.clone(),
                    iv: k.iv,
                })
            }),
        })
        .collect();

    let report = download_segments(
        transport,
        tasks,
        Some(referer),
        options.workers,
        observer,
    )
    .await;

    if let BatchStatus::PartialFailure(failed) = report.status() {
        error!(
            "Failed to download {} out of {} segments.",
            failed.len(),
            segments.len()
        );
        for segment in &failed {
            error!(" - segment {}: {}", segment.index, segment.url);
        }
        return Ok(JobOutcome::NeedsAttention {
            segments_dir,
            failed,
        });
    }

    info!("All {} segments downloaded successfully.", segments.len());

    let indices: Vec<usize> = segments.iter().map(|s| s.index).collect();
    info!("Merging segments into: {:?}", output);
    merge_segments(&segments_dir, &indices, &output).await?;

    if !options.keep_segments {
        if let Err(e) = cleanup_segments(&segments_dir).await {
            warn!("Failed to clean up {:?}: {}", segments_dir, e);
        }
    }

    Ok(JobOutcome::Completed {
        output,
        segments: indices.len(),
    })
}

/// 在派发下载前获取所有用到的密钥；任一失败则整个任务失败
async fn resolve_keys<'a>(
    transport: Arc<dyn Transport>,
    referer: &Url,
    descriptors: impl Iterator<Item = &'a KeyDescriptor>,
) -> Result<HashMap<Url, bytes::Bytes>> {
    let resolver = KeyResolver::new(transport, Some(referer.clone()));
    let mut keys = HashMap::new();
    for descriptor in descriptors {
        let bytes = resolver.resolve(descriptor).await?;
        keys.insert(descriptor.uri.clone(), bytes);
    }
    Ok(keys)
}
