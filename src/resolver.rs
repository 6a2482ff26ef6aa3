use log::info;
use std::sync::Arc;
use url::Url;

use crate::error::{Error, Result};
use crate::http::Transport;
use crate::playlist::{self, manifest_base, PlaylistDocument};

pub const DEFAULT_MAX_VARIANT_DEPTH: usize = 32;

/// 解析完成的叶子播放列表
#[derive(Debug, Clone)]
pub struct ResolvedPlaylist {
    pub url: Url,
    pub document: PlaylistDocument,
}

/// 沿变体引用逐级跟进，直到得到包含分段的播放列表
pub struct ManifestResolver {
    transport: Arc<dyn Transport>,
    /// 解析变体URI时使用的基址；为空时使用引用它的播放列表所在目录
    variant_base: Option<Url>,
    max_depth: usize,
}

impl ManifestResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            variant_base: None,
            max_depth: DEFAULT_MAX_VARIANT_DEPTH,
        }
    }

    pub fn with_variant_base(mut self, base: Option<Url>) -> Self {
        self.variant_base = base;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 返回叶子播放列表的URL
    pub async fn resolve(&self, root: &Url) -> Result<Url> {
        Ok(self.resolve_playlist(root).await?.url)
    }

    /// 返回叶子播放列表的URL及其解析结果
    pub async fn resolve_playlist(&self, root: &Url) -> Result<ResolvedPlaylist> {
        let mut url = root.clone();

        // 最多跟进 max_depth 次变体引用
        for hop in 0..=self.max_depth {
            let document = self.fetch(&url).await?;
            let variants = match document {
                PlaylistDocument::Variant(variants) => variants,
                leaf => {
                    if hop > 0 {
                        info!("Resolved media playlist {} after {} hops", url, hop);
                    }
                    return Ok(ResolvedPlaylist {
                        url,
                        document: leaf,
                    });
                }
            };

            // parse 保证变体列表非空
            let Some(first) = variants.first() else {
                return Err(Error::MalformedManifest {
                    url,
                    reason: "no variant streams found".to_string(),
                });
            };
            let base = self
                .variant_base
                .clone()
                .unwrap_or_else(|| manifest_base(&url));
            let next = playlist::resolve_uri(&base, &first.uri, &url)?;
            info!("Following variant {} -> {}", url, next);
            url = next;
        }

        Err(Error::VariantResolutionLoop {
            url: root.clone(),
            limit: self.max_depth,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<PlaylistDocument> {
        info!("Fetching playlist from {}", url);
        let referer = manifest_base(url);
        let text = self
            .transport
            .get_text(url, Some(&referer))
            .await
            .map_err(|source| Error::ManifestFetch {
                url: url.clone(),
                source,
            })?;
        playlist::parse(&text, url)
    }
}
