use std::io;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// 传输层错误（HTTP 抽象边界）
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status {status} for {url}")]
    Status { url: Url, status: u16 },

    #[error("{0}")]
    Other(String),
}

/// 单个分段的失败原因，只记录、不向上传播
#[derive(Debug, Error)]
pub enum SegmentFetchError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("decryption error: {0}")]
    Decrypt(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("task aborted: {0}")]
    TaskAborted(String),
}

/// 导致整个任务终止的错误
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to fetch manifest {url}: {source}")]
    ManifestFetch {
        url: Url,
        #[source]
        source: TransportError,
    },

    #[error("Malformed manifest {url}: {reason}")]
    MalformedManifest { url: Url, reason: String },

    #[error("Variant resolution from {url} did not reach a media playlist within {limit} hops")]
    VariantResolutionLoop { url: Url, limit: usize },

    #[error("Failed to fetch key {url}: {source}")]
    KeyFetch {
        url: Url,
        #[source]
        source: TransportError,
    },

    #[error("Key from {url} has {len} bytes, expected 16, 24 or 32")]
    InvalidKeyLength { url: Url, len: usize },

    #[error("Failed to reassemble {path:?}: {source}")]
    Reassembly {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid URL {0}: {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
