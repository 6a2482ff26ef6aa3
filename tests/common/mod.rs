#![allow(dead_code)]

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use m3u8_assembler::error::TransportError;
use m3u8_assembler::http::Transport;

enum Route {
    Body { body: Bytes, delay: Duration },
    Fail(u16),
}

/// 内存中的传输实现，记录所有请求
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    completed: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: impl Into<Bytes>) {
        self.serve_delayed(url, body, Duration::ZERO);
    }

    pub fn serve_delayed(&self, url: &str, body: impl Into<Bytes>, delay: Duration) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route::Body {
                body: body.into(),
                delay,
            },
        );
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route::Fail(status));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn referers(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| u.as_str() == url).count()
    }

    /// 按完成先后记录的URL
    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url, referer: Option<&Url>) -> Result<Bytes, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), referer.map(|r| r.to_string())));

        let route = {
            let routes = self.routes.lock().unwrap();
            match routes.get(url.as_str()) {
                Some(Route::Body { body, delay }) => Ok((body.clone(), *delay)),
                Some(Route::Fail(status)) => Err(*status),
                None => Err(404),
            }
        };

        match route {
            Ok((body, delay)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.completed.lock().unwrap().push(url.to_string());
                Ok(body)
            }
            Err(status) => Err(TransportError::Status {
                url: url.clone(),
                status,
            }),
        }
    }
}

pub fn media_playlist(segments: &[&str]) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
    for segment in segments {
        text.push_str("#EXTINF:10.0,\n");
        text.push_str(segment);
        text.push('\n');
    }
    text.push_str("#EXT-X-ENDLIST\n");
    text
}

pub fn master_playlist(variants: &[&str]) -> String {
    let mut text = String::from("#EXTM3U\n");
    for (i, variant) in variants.iter().enumerate() {
        text.push_str(&format!("#EXT-X-STREAM-INF:BANDWIDTH={}\n", (i + 1) * 1_000_000));
        text.push_str(variant);
        text.push('\n');
    }
    text
}

pub fn encrypt(plain: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; plain.len() + 16];
    buf[..plain.len()].copy_from_slice(plain);
    cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
        .unwrap()
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plain.len())
        .unwrap()
        .to_vec()
}
