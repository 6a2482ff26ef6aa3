use clap::Parser;
use std::path::{Path, PathBuf};

/// Downloads an M3U8 stream segment by segment and merges it into one file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The M3U8 URL to download.
    #[arg(short, long, required_unless_present = "batch")]
    pub url: Option<String>,

    /// Output filename, without extension.
    #[arg(short, long, default_value = "output")]
    pub name: String,

    /// Directory to write the merged file to.
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Extension of the merged file.
    #[arg(long, default_value = "ts")]
    pub ext: String,

    /// Skip the download if the merged file already exists.
    #[arg(short, long)]
    pub skip_existing: bool,

    /// Maximum number of concurrent downloads. Defaults to the number of CPUs.
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Base URL for variant playlist references (for streams whose variants live on another CDN).
    #[arg(long)]
    pub variant_base: Option<String>,

    /// Maximum number of variant playlists to follow.
    #[arg(long, default_value_t = 32)]
    pub max_variant_depth: usize,

    /// Directory for intermediate segment files.
    #[arg(long, default_value = "ts_temp")]
    pub temp_dir: PathBuf,

    /// Keep downloaded segments after merging.
    #[arg(long)]
    pub keep_segments: bool,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Custom HTTP header(s). E.g., -H "Cookie: mycookie"
    #[arg(short = 'H', long = "header", action = clap::ArgAction::Append)]
    pub headers: Vec<String>,

    /// File with one job per line: "<name> <m3u8 url>".
    #[arg(long, conflicts_with = "url")]
    pub batch: Option<PathBuf>,
}

pub fn parse_args() -> Args {
    Args::parse()
}

/// 批量任务文件中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub name: String,
    pub url: String,
}

/// 解析批量任务：URL 为每行最后一个空白分隔的字段，其余部分为名称
pub fn parse_batch(content: &str) -> anyhow::Result<Vec<BatchEntry>> {
    let mut entries = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.rsplit_once(char::is_whitespace) {
            Some((name, url)) if !name.trim().is_empty() => entries.push(BatchEntry {
                name: name.trim().to_string(),
                url: url.to_string(),
            }),
            _ => anyhow::bail!("line {}: expected \"<name> <url>\", got {:?}", line_no + 1, line),
        }
    }
    Ok(entries)
}

pub async fn read_batch(path: &Path) -> anyhow::Result<Vec<BatchEntry>> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_batch(&content)
}
