use bytes::Bytes;
use log::debug;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::crypto::decrypt_data;
use crate::error::SegmentFetchError;
use crate::http::Transport;

/// 分段解密所需的密钥材料
#[derive(Debug, Clone)]
pub struct SegmentKey {
    pub key: Bytes,
    pub iv: Option<[u8; 16]>,
}

impl SegmentKey {
    /// 播放列表未给出IV时沿用原始密钥字节作为IV（兼容现有流，并非推荐做法）
    pub fn iv(&self) -> &[u8] {
        match &self.iv {
            Some(iv) => iv.as_slice(),
            None => &self.key[..],
        }
    }
}

/// 单个分段的下载任务
#[derive(Debug, Clone)]
pub struct SegmentTask {
    pub index: usize,
    pub url: Url,
    pub dest: PathBuf,
    pub key: Option<SegmentKey>,
}

#[derive(Debug)]
pub enum FetchStatus {
    Success,
    Failed(SegmentFetchError),
}

#[derive(Debug)]
pub struct FetchResult {
    pub index: usize,
    pub url: Url,
    pub status: FetchStatus,
    pub path: Option<PathBuf>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Success)
    }

    pub(crate) fn failed(index: usize, url: Url, error: SegmentFetchError) -> Self {
        Self {
            index,
            url,
            status: FetchStatus::Failed(error),
            path: None,
        }
    }
}

/// 分段文件名：固定5位补零，保证字典序与数值序一致
pub fn segment_file_name(index: usize) -> String {
    format!("{:05}.ts", index)
}

/// 下载（并在需要时解密）单个分段；任何错误都转成 `FetchStatus::Failed`
pub async fn fetch_segment(
    transport: &dyn Transport,
    task: &SegmentTask,
    referer: Option<&Url>,
) -> FetchResult {
    match try_fetch_segment(transport, task, referer).await {
        Ok(()) => FetchResult {
            index: task.index,
            url: task.url.clone(),
            status: FetchStatus::Success,
            path: Some(task.dest.clone()),
        },
        Err(e) => FetchResult::failed(task.index, task.url.clone(), e),
    }
}

async fn try_fetch_segment(
    transport: &dyn Transport,
    task: &SegmentTask,
    referer: Option<&Url>,
) -> Result<(), SegmentFetchError> {
    if fs::try_exists(&task.dest).await? {
        debug!("Segment {:?} already exists. Skipping.", task.dest);
        return Ok(());
    }

    let data = transport.get(&task.url, referer).await?;

    let content = match &task.key {
        Some(key) => decrypt_data(&data, &key.key, key.iv()).map_err(SegmentFetchError::Decrypt)?,
        None => data.to_vec(),
    };

    write_atomically(&task.dest, &content).await?;
    Ok(())
}

/// 先写入 `.part` 文件再重命名，避免留下半截分段
async fn write_atomically(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let part_path = path.with_extension("part");
    let mut file = fs::File::create(&part_path).await?;
    file.write_all(content).await?;
    file.flush().await?;
    drop(file);

    if let Err(e) = fs::rename(&part_path, path).await {
        let _ = fs::remove_file(&part_path).await;
        return Err(e);
    }
    Ok(())
}
