// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod ffmpeg;
pub mod splitter;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::task::MergeProgress;

pub use ffmpeg::FfmpegToolkit;
pub use splitter::{plan_split, PreparedPart, SplitPlan, Splitter};

/// 媒体处理错误
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code:?}: {message}")]
    ProcessFailed {
        tool: String,
        code: Option<i32>,
        message: String,
    },

    #[error("Manifest request failed: {0}")]
    Manifest(#[from] reqwest::Error),

    #[error("Manifest contains no media segments")]
    EmptyManifest,

    #[error("Could not determine media duration: {0}")]
    Probe(String),

    #[error("Output file is missing or empty: {0}")]
    EmptyOutput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 合并进度回调
pub type MergeProgressFn<'a> = &'a (dyn Fn(MergeProgress) + Send + Sync);

/// 外部重封装工具的契约
///
/// 只做流复制，不重新编码。退出码 0 视为成功。
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// 把分段流清单合并为一个本地文件
    ///
    /// # 参数
    ///
    /// * `manifest_url` - 分段流清单地址
    /// * `headers` - 访问分段时附带的请求头
    /// * `output` - 输出文件路径
    /// * `on_progress` - 每打开一个分段回调一次
    async fn merge(
        &self,
        manifest_url: &str,
        headers: &HashMap<String, String>,
        output: &Path,
        on_progress: MergeProgressFn<'_>,
    ) -> Result<(), MediaError>;

    /// 读取媒体时长（秒）
    async fn probe_duration(&self, input: &Path) -> Result<f64, MediaError>;

    /// 按时间切出一段，`duration` 为 `None` 时切到文件末尾
    async fn cut(
        &self,
        input: &Path,
        start_secs: f64,
        duration_secs: Option<f64>,
        output: &Path,
    ) -> Result<(), MediaError>;
}

/// 确认文件存在且非空，返回文件大小
pub async fn ensure_non_empty(path: &Path) -> Result<u64, MediaError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => Err(MediaError::EmptyOutput(path.display().to_string())),
    }
}
