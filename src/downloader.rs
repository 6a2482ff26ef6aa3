use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

use crate::error::SegmentFetchError;
use crate::fetcher::{fetch_segment, FetchResult, SegmentTask};
use crate::http::Transport;
use crate::progress::ProgressObserver;

/// 下载失败、需要人工处理的分段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSegment {
    pub index: usize,
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    AllSucceeded,
    PartialFailure(Vec<FailedSegment>),
}

/// 一批分段的下载结果，按分段序号排序
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<FetchResult>,
}

impl BatchReport {
    pub fn status(&self) -> BatchStatus {
        let failed: Vec<_> = self
            .results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| FailedSegment {
                index: r.index,
                url: r.url.clone(),
            })
            .collect();

        if failed.is_empty() {
            BatchStatus::AllSucceeded
        } else {
            BatchStatus::PartialFailure(failed)
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

/// 默认并发数：可用的硬件并行度
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// 并发下载所有分段；单个分段失败不会中断整批
pub async fn download_segments(
    transport: Arc<dyn Transport>,
    tasks: Vec<SegmentTask>,
    referer: Option<Url>,
    max_concurrency: usize,
    observer: Arc<dyn ProgressObserver>,
) -> BatchReport {
    let total = tasks.len();
    let completed = Arc::new(AtomicUsize::new(0));
    observer.on_start(total);

    let fetches = stream::iter(tasks)
        .map(|task| {
            let transport = transport.clone();
            let referer = referer.clone();
            let completed = completed.clone();
            let observer = observer.clone();
            let index = task.index;
            let url = task.url.clone();

            let handle = {
                let completed = completed.clone();
                let observer = observer.clone();
                tokio::spawn(async move {
                    let result = fetch_segment(transport.as_ref(), &task, referer.as_ref()).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    observer.on_segment_done(done, total, &result);
                    result
                })
            };

            async move {
                match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Download task for segment {} aborted: {}", index, e);
                        let result = FetchResult::failed(
                            index,
                            url,
                            SegmentFetchError::TaskAborted(e.to_string()),
                        );
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        observer.on_segment_done(done, total, &result);
                        result
                    }
                }
            }
        })
        .buffer_unordered(max_concurrency.max(1));

    let mut results: Vec<FetchResult> = fetches.collect().await;
    results.sort_by_key(|r| r.index);

    let report = BatchReport { results };
    let failed = total - report.succeeded();
    debug!("Batch finished: {} ok, {} failed", report.succeeded(), failed);
    observer.on_finish(failed);

    report
}
