// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::client::{
    DeliveryClient, DeliveryError, DeliveryIdentity, HandleStatus, UploadProgressFn,
};

const CHUNK_SIZE: usize = 64 * 1024;
const PROGRESS_TICK: Duration = Duration::from_millis(500);

static RETRY_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)retry after (\d+)").expect("Failed to compile retry-after regex")
});

struct Session {
    client: reqwest::Client,
    last_used: Mutex<Instant>,
}

impl Session {
    fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_default();
        Self {
            client,
            last_used: Mutex::new(Instant::now()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ApiParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiParameters {
    retry_after: Option<u64>,
}

/// 机器人接口风格的投递客户端
///
/// 每个上传身份懒加载一个独立会话，空闲超时后由会话回收器关闭。
pub struct HttpDeliveryClient {
    api_base: String,
    sessions: DashMap<String, Arc<Session>>,
    check_client: reqwest::Client,
}

impl HttpDeliveryClient {
    pub fn new(api_base: &str) -> Self {
        let check_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            sessions: DashMap::new(),
            check_client,
        }
    }

    fn session(&self, identity_key: &str) -> reqwest::Client {
        let session = self
            .sessions
            .entry(identity_key.to_string())
            .or_insert_with(|| {
                debug!("Opening delivery session for {}", identity_key);
                Arc::new(Session::new())
            })
            .clone();
        *session.last_used.lock() = Instant::now();
        session.client.clone()
    }

    /// 当前打开的会话数
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// 关闭空闲超过 `max_idle` 的会话
    ///
    /// # 返回值
    ///
    /// 被关闭的会话数
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_used.lock().elapsed() < max_idle);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!("Closed {} idle delivery sessions", evicted);
        }
        evicted
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, token, method)
    }
}

fn file_body(file: tokio::fs::File, sent: Arc<AtomicU64>) -> Body {
    let stream = futures::stream::unfold((file, sent), |(mut file, sent)| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                sent.fetch_add(n as u64, Ordering::Relaxed);
                Some((Ok::<Bytes, std::io::Error>(Bytes::from(buf)), (file, sent)))
            }
            Err(e) => Some((Err(e), (file, sent))),
        }
    });
    Body::wrap_stream(stream)
}

fn classify_transport(error: reqwest::Error) -> DeliveryError {
    if error.is_timeout() {
        DeliveryError::Timeout
    } else if error.is_connect() || error.is_request() || error.is_body() {
        DeliveryError::Network(error.to_string())
    } else {
        DeliveryError::Unknown(error.to_string())
    }
}

fn classify_failure(status: StatusCode, response: &ApiResponse) -> DeliveryError {
    let description = response
        .description
        .clone()
        .unwrap_or_else(|| status.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        let seconds = response
            .parameters
            .as_ref()
            .and_then(|p| p.retry_after)
            .or_else(|| retry_after_from_description(&description))
            .unwrap_or(1);
        return DeliveryError::FloodWait { seconds };
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return DeliveryError::Auth(description);
    }
    if status.is_server_error() {
        return DeliveryError::Network(description);
    }
    if is_invalid_handle(&description) {
        return DeliveryError::InvalidHandle(description);
    }
    DeliveryError::Unknown(description)
}

// Some proxies strip `parameters` but keep the human readable text
fn retry_after_from_description(description: &str) -> Option<u64> {
    RETRY_AFTER
        .captures(description)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn is_invalid_handle(description: &str) -> bool {
    let lower = description.to_lowercase();
    lower.contains("wrong file_id")
        || lower.contains("invalid file_id")
        || lower.contains("wrong remote file identifier")
}

async fn read_response(response: reqwest::Response) -> Result<ApiResponse, DeliveryError> {
    let status = response.status();
    let body = response.text().await.map_err(classify_transport)?;
    let parsed: ApiResponse = serde_json::from_str(&body).unwrap_or(ApiResponse {
        ok: false,
        result: None,
        description: Some(body.chars().take(200).collect()),
        parameters: None,
    });
    if status.is_success() && parsed.ok {
        Ok(parsed)
    } else {
        Err(classify_failure(status, &parsed))
    }
}

fn extract_file_id(result: &serde_json::Value) -> Option<String> {
    ["document", "video"].iter().find_map(|field| {
        result
            .get(field)
            .and_then(|media| media.get("file_id"))
            .and_then(|id| id.as_str())
            .map(str::to_string)
    })
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn send_file(
        &self,
        identity: &DeliveryIdentity,
        destination: &str,
        path: &Path,
        progress: UploadProgressFn<'_>,
    ) -> Result<String, DeliveryError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| DeliveryError::Unknown(format!("cannot open {}: {}", path.display(), e)))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| DeliveryError::Unknown(e.to_string()))?
            .len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());

        let sent = Arc::new(AtomicU64::new(0));
        let part = Part::stream_with_length(file_body(file, sent.clone()), total).file_name(file_name);
        let form = Form::new()
            .text("chat_id", destination.to_string())
            .part("document", part);

        let client = self.session(&identity.key);
        let request = client
            .post(self.method_url(&identity.token, "sendDocument"))
            .multipart(form)
            .send();
        tokio::pin!(request);

        let mut ticker = tokio::time::interval(PROGRESS_TICK);
        let response = loop {
            tokio::select! {
                result = &mut request => break result,
                _ = ticker.tick() => progress(sent.load(Ordering::Relaxed).min(total), total),
            }
        };

        let parsed = read_response(response.map_err(classify_transport)?).await?;
        let file_id = parsed
            .result
            .as_ref()
            .and_then(extract_file_id)
            .ok_or_else(|| DeliveryError::Unknown("response carried no file_id".to_string()))?;

        progress(total, total);
        Ok(file_id)
    }

    async fn check_handle(
        &self,
        credential_token: &str,
        handle: &str,
    ) -> Result<HandleStatus, DeliveryError> {
        let response = self
            .check_client
            .get(self.method_url(credential_token, "getFile"))
            .query(&[("file_id", handle)])
            .send()
            .await
            .map_err(classify_transport)?;

        match read_response(response).await {
            Ok(_) => Ok(HandleStatus::Valid),
            Err(DeliveryError::InvalidHandle(_)) => Ok(HandleStatus::Expired),
            Err(e) => Err(e),
        }
    }
}
