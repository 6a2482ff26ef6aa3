use log::{debug, info};
use m3u8_rs::{KeyMethod, MediaPlaylist, MasterPlaylist, Playlist};
use url::Url;

use crate::error::{Error, Result};

/// 密钥描述（EXT-X-KEY）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub uri: Url,
    /// 未指定时，解密使用原始密钥字节作为IV
    pub iv: Option<[u8; 16]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// 在播放列表中的位置，决定合并顺序
    pub index: usize,
    pub uri: Url,
    /// 该分段位置生效的密钥
    pub key: Option<KeyDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantReference {
    /// 原始（未解析的）URI，由解析器根据配置的基址解析
    pub uri: String,
}

/// 解析后的播放列表：要么是变体索引，要么是叶子列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistDocument {
    Variant(Vec<VariantReference>),
    Leaf {
        segments: Vec<SegmentDescriptor>,
        key: Option<KeyDescriptor>,
    },
}

impl PlaylistDocument {
    pub fn is_variant(&self) -> bool {
        matches!(self, PlaylistDocument::Variant(_))
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        match self {
            PlaylistDocument::Leaf { segments, .. } => segments,
            PlaylistDocument::Variant(_) => &[],
        }
    }

    pub fn key(&self) -> Option<&KeyDescriptor> {
        match self {
            PlaylistDocument::Leaf { key, .. } => key.as_ref(),
            PlaylistDocument::Variant(_) => None,
        }
    }
}

/// 播放列表的基址：去掉最后一个路径分量
pub fn manifest_base(url: &Url) -> Url {
    url.join(".").unwrap_or_else(|_| url.clone())
}

/// 解析M3U8文本，相对URI基于 `manifest_url` 所在目录解析
pub fn parse(document: &str, manifest_url: &Url) -> Result<PlaylistDocument> {
    let malformed = |reason: String| Error::MalformedManifest {
        url: manifest_url.clone(),
        reason,
    };

    let playlist = m3u8_rs::parse_playlist_res(document.as_bytes())
        .map_err(|e| malformed(format!("Failed to parse M3U8 playlist: {}", e)))?;

    let parsed = match playlist {
        Playlist::MasterPlaylist(pl) => parse_master(pl),
        Playlist::MediaPlaylist(pl) => parse_media(pl, manifest_url)?,
    };

    match &parsed {
        PlaylistDocument::Variant(variants) if variants.is_empty() => {
            Err(malformed("no variant streams found".to_string()))
        }
        PlaylistDocument::Leaf { segments, .. } if segments.is_empty() => {
            Err(malformed("no segments found".to_string()))
        }
        _ => Ok(parsed),
    }
}

fn parse_master(pl: MasterPlaylist) -> PlaylistDocument {
    info!("Master playlist found with {} variants.", pl.variants.len());
    let variants = pl
        .variants
        .into_iter()
        .filter(|v| !v.is_i_frame)
        .map(|v| VariantReference { uri: v.uri })
        .collect();
    PlaylistDocument::Variant(variants)
}

fn parse_media(pl: MediaPlaylist, manifest_url: &Url) -> Result<PlaylistDocument> {
    let base = manifest_base(manifest_url);
    let mut current_key: Option<KeyDescriptor> = None;
    let mut first_key: Option<KeyDescriptor> = None;
    let mut segments = Vec::with_capacity(pl.segments.len());

    for (index, segment) in pl.segments.into_iter().enumerate() {
        // EXT-X-KEY 对其后的所有分段生效，直到被替换
        if let Some(key) = segment.key {
            current_key = match key.method {
                KeyMethod::None => None,
                KeyMethod::AES128 => {
                    let uri = key.uri.ok_or_else(|| Error::MalformedManifest {
                        url: manifest_url.clone(),
                        reason: "EXT-X-KEY without URI".to_string(),
                    })?;
                    let iv = key
                        .iv
                        .as_deref()
                        .map(parse_iv)
                        .transpose()
                        .map_err(|reason| Error::MalformedManifest {
                            url: manifest_url.clone(),
                            reason,
                        })?;
                    Some(KeyDescriptor {
                        uri: resolve_uri(&base, &uri, manifest_url)?,
                        iv,
                    })
                }
                other => {
                    return Err(Error::MalformedManifest {
                        url: manifest_url.clone(),
                        reason: format!("unsupported key method {}", other),
                    });
                }
            };
            if first_key.is_none() {
                first_key = current_key.clone();
            }
        }

        segments.push(SegmentDescriptor {
            index,
            uri: resolve_uri(&base, &segment.uri, manifest_url)?,
            key: current_key.clone(),
        });
    }

    debug!(
        "Media playlist with {} segments, encrypted: {}",
        segments.len(),
        first_key.is_some()
    );

    Ok(PlaylistDocument::Leaf {
        segments,
        key: first_key,
    })
}

/// 解析十六进制IV（可带 0x 前缀）
pub fn parse_iv(iv: &str) -> std::result::Result<[u8; 16], String> {
    let hex_str = iv.trim_start_matches("0x").trim_start_matches("0X");
    let mut bytes = [0u8; 16];
    hex::decode_to_slice(hex_str, &mut bytes)
        .map_err(|e| format!("invalid IV {}: {}", iv, e))?;
    Ok(bytes)
}

pub(crate) fn resolve_uri(base: &Url, uri: &str, manifest_url: &Url) -> Result<Url> {
    // 带协议头的URI视为绝对地址
    if let Ok(absolute) = Url::parse(uri) {
        return Ok(absolute);
    }
    base.join(uri).map_err(|e| Error::MalformedManifest {
        url: manifest_url.clone(),
        reason: format!("cannot resolve {}: {}", uri, e),
    })
}
