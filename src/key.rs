use bytes::Bytes;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

use crate::error::{Error, Result};
use crate::http::Transport;
use crate::playlist::KeyDescriptor;

/// 支持的 AES 密钥长度（128/192/256 位）
pub const KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// 按任务缓存的密钥获取器，每个密钥URI只请求一次
pub struct KeyResolver {
    transport: Arc<dyn Transport>,
    referer: Option<Url>,
    cache: Mutex<HashMap<Url, Bytes>>,
}

impl KeyResolver {
    pub fn new(transport: Arc<dyn Transport>, referer: Option<Url>) -> Self {
        Self {
            transport,
            referer,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, key: &KeyDescriptor) -> Result<Bytes> {
        let mut cache = self.cache.lock().await;
        if let Some(bytes) = cache.get(&key.uri) {
            return Ok(bytes.clone());
        }

        info!("Fetching decryption key from {}", key.uri);
        let bytes = self
            .transport
            .get(&key.uri, self.referer.as_ref())
            .await
            .map_err(|source| Error::KeyFetch {
                url: key.uri.clone(),
                source,
            })?;

        if !KEY_LENGTHS.contains(&bytes.len()) {
            return Err(Error::InvalidKeyLength {
                url: key.uri.clone(),
                len: bytes.len(),
            });
        }

        cache.insert(key.uri.clone(), bytes.clone());
        Ok(bytes)
    }
}
