// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::domain::services::extraction_service::{
    ExtractionError, ExtractionResult, Extractor,
};

#[derive(Serialize)]
struct ExtractRequest<'a> {
    source_url: &'a str,
    variant: &'a str,
}

/// 通过 HTTP 调用的提取服务客户端
///
/// 204 或空结果表示"暂时没有可用结果"，超时、连接失败、429 与 5xx
/// 归为可重试失败，其余 4xx 为不可重试失败。
pub struct HttpExtractor {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpExtractor {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self, ExtractionError> {
        let endpoint = Url::parse(service_url)
            .map_err(|e| ExtractionError::Fatal(format!("invalid extraction url: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Fatal(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

fn classify(error: reqwest::Error) -> ExtractionError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        ExtractionError::Transient(error.to_string())
    } else {
        ExtractionError::Fatal(error.to_string())
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(
        &self,
        source_url: &str,
        variant: &str,
    ) -> Result<Option<ExtractionResult>, ExtractionError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ExtractRequest {
                source_url,
                variant,
            })
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            debug!("Extraction returned no result for {}", source_url);
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            warn!("Extraction service answered {} for {}", status, source_url);
            return Err(ExtractionError::Transient(format!(
                "extraction service answered {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ExtractionError::Fatal(format!(
                "extraction service rejected request: {}",
                status
            )));
        }

        let result: Option<ExtractionResult> = response.json().await.map_err(classify)?;
        Ok(result.filter(|r| !r.media_url.trim().is_empty()))
    }
}
