use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use reqwest::{Client, header::{HeaderMap, HeaderName, HeaderValue, REFERER}};
use std::time::Duration;
use url::Url;

use crate::error::TransportError;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// 下载引擎唯一的外部依赖：给定URL，返回响应体
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, referer: Option<&Url>) -> Result<Bytes, TransportError>;

    /// 获取文本内容（播放列表）
    async fn get_text(&self, url: &Url, referer: Option<&Url>) -> Result<String, TransportError> {
        let body = self.get(url, referer).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// 基于 reqwest 的传输实现
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url, referer: Option<&Url>) -> Result<Bytes, TransportError> {
        let mut request = self.client.get(url.clone());
        if let Some(referer) = referer {
            request = request.header(REFERER, referer.as_str());
        }

        let mut response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
        }
        debug!("GET {} -> {} bytes", url, body.len());

        Ok(Bytes::from(body))
    }
}

/// 构建HTTP客户端，包含自定义请求头
pub fn build_http_client(custom_headers: &[String], timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));

    for header in custom_headers {
        if let Some((key, value)) = header.split_once(':') {
            let header_name = HeaderName::from_bytes(key.trim().as_bytes())?;
            let header_value = HeaderValue::from_str(value.trim())?;
            headers.insert(header_name, header_value);
        } else {
            warn!("Ignoring malformed header: {}", header);
        }
    }

    debug!("Using HTTP headers: {:?}", headers);

    let client = Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()?;

    Ok(client)
}
