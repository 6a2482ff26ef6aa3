use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::{Error, Result};
use crate::fetcher::segment_file_name;

/// 按分段序号升序拼接分段文件
///
/// 先写入 `<output>.part`，全部成功后再重命名为最终文件；
/// 任一分段读取失败时删除半成品并返回 `Error::Reassembly`。
pub async fn merge_segments(segments_dir: &Path, indices: &[usize], output_path: &Path) -> Result<()> {
    let mut ordered = indices.to_vec();
    ordered.sort_unstable();
    ordered.dedup();

    let part_path = part_path(output_path);
    match concat_into(segments_dir, &ordered, &part_path).await {
        Ok(bytes) => {
            fs::rename(&part_path, output_path)
                .await
                .map_err(|source| Error::Reassembly {
                    path: output_path.to_path_buf(),
                    source,
                })?;
            info!(
                "Merged {} segments ({} bytes) into {:?}",
                ordered.len(),
                bytes,
                output_path
            );
            Ok(())
        }
        Err((path, source)) => {
            let _ = fs::remove_file(&part_path).await;
            Err(Error::Reassembly { path, source })
        }
    }
}

async fn concat_into(
    segments_dir: &Path,
    ordered: &[usize],
    part_path: &Path,
) -> std::result::Result<u64, (PathBuf, std::io::Error)> {
    let file = fs::File::create(part_path)
        .await
        .map_err(|e| (part_path.to_path_buf(), e))?;
    let mut writer = BufWriter::new(file);
    let mut total = 0u64;

    for &index in ordered {
        let segment_path = segments_dir.join(segment_file_name(index));
        let mut segment = fs::File::open(&segment_path)
            .await
            .map_err(|e| (segment_path.clone(), e))?;
        total += tokio::io::copy(&mut segment, &mut writer)
            .await
            .map_err(|e| (segment_path.clone(), e))?;
    }

    writer.flush().await.map_err(|e| (part_path.to_path_buf(), e))?;
    Ok(total)
}

fn part_path(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// 删除临时分段目录
pub async fn cleanup_segments(segments_dir: &Path) -> Result<()> {
    match fs::remove_dir_all(segments_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Segment directory {:?} already removed", segments_dir);
            Ok(())
        }
        Err(e) => Err(Error::Io(e)),
    }
}
