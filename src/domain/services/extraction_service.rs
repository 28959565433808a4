// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// 提取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// 质量标签（例如 1080p）
    pub quality: String,
    /// 分段流清单地址
    pub media_url: String,
    /// 访问媒体地址时需要携带的请求头
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    /// 展示用标题
    #[serde(default)]
    pub title: Option<String>,
    /// 展示用海报
    #[serde(default)]
    pub poster_url: Option<String>,
}

/// 提取错误
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// 短暂性失败（超时、连接失败、上游 5xx），整个任务可重新入队
    #[error("Transient extraction failure: {0}")]
    Transient(String),
    /// 不可重试的失败
    #[error("Extraction failed: {0}")]
    Fatal(String),
}

impl ExtractionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractionError::Transient(_))
    }
}

/// 提取服务特质
///
/// 外部协作方，必须可以安全地重复调用。空结果（`Ok(None)`）是
/// 正常的可重试结果，而不是错误。
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        source_url: &str,
        variant: &str,
    ) -> Result<Option<ExtractionResult>, ExtractionError>;
}
