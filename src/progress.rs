use indicatif::{ProgressBar, ProgressStyle};

use crate::fetcher::{FetchResult, FetchStatus};

/// 进度通知，仅作副作用，不影响下载流程
pub trait ProgressObserver: Send + Sync {
    fn on_start(&self, _total: usize) {}

    fn on_segment_done(&self, completed: usize, total: usize, result: &FetchResult);

    fn on_finish(&self, _failed: usize) {}
}

/// 不输出任何进度
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn on_segment_done(&self, _completed: usize, _total: usize, _result: &FetchResult) {}
}

/// 终端进度条
pub struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let pb = ProgressBar::hidden();
        let style = ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        Self { pb }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for BarProgress {
    fn on_start(&self, total: usize) {
        self.pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.pb.set_length(total as u64);
        self.pb.set_position(0);
        self.pb.set_message("downloading");
    }

    fn on_segment_done(&self, completed: usize, _total: usize, result: &FetchResult) {
        if let FetchStatus::Failed(e) = &result.status {
            self.pb
                .println(format!("Segment {} failed: {} ({})", result.index, e, result.url));
        }
        self.pb.set_position(completed as u64);
    }

    fn on_finish(&self, failed: usize) {
        if failed > 0 {
            self.pb
                .abandon_with_message(format!("{} segments need manual download", failed));
        } else {
            self.pb.finish_with_message("downloaded");
        }
    }
}
