// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 下载任务
///
/// 一次用户发起的"获取并投递某个内容"的请求。任务本身不持久化，
/// 只以 JSON 形式存在于临时存储的队列中。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// 任务唯一标识符
    pub task_id: String,
    /// 来源地址，交给提取服务解析
    pub source_url: String,
    /// 内容的稳定标识（例如目录 ID）
    pub content_key: String,
    /// 变体选择（语言/音轨）
    pub variant: String,
    /// 请求者标识
    pub requester_id: String,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
}

impl DownloadTask {
    /// 创建一个新的下载任务
    ///
    /// # 参数
    ///
    /// * `source_url` - 来源地址
    /// * `content_key` - 内容标识
    /// * `variant` - 变体
    /// * `requester_id` - 请求者
    ///
    /// # 返回值
    ///
    /// 返回带有新任务 ID 的任务实例
    pub fn new(
        source_url: impl Into<String>,
        content_key: impl Into<String>,
        variant: impl Into<String>,
        requester_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            source_url: source_url.into(),
            content_key: content_key.into(),
            variant: variant.into(),
            requester_id: requester_id.into(),
            created_at: Utc::now().into(),
        }
    }

    /// 重复请求抑制使用的三元组键
    pub fn claim_key(&self) -> String {
        claim_key(&self.requester_id, &self.content_key, &self.variant)
    }
}

/// 构造 (请求者, 内容, 变体) 的占用键
pub fn claim_key(requester_id: &str, content_key: &str, variant: &str) -> String {
    format!("download:claim:{}:{}:{}", requester_id, content_key, variant)
}

/// 流水线阶段
///
/// 状态转换遵循以下流程：
/// Queued → Extracting → Merging → Uploading → Done，
/// 任何非终止阶段都可以转入 Error。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    /// 已入队，等待工作槽位
    #[default]
    Queued,
    /// 正在调用提取服务
    Extracting,
    /// 正在合并分段流
    Merging,
    /// 正在上传
    Uploading,
    /// 已完成
    Done,
    /// 已失败
    Error,
}

impl TaskStage {
    /// 是否为终止阶段
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStage::Done | TaskStage::Error)
    }

    /// 判断是否允许从当前阶段转换到 `next`
    ///
    /// `Extracting → Queued` 对应可重试失败后的重新入队。
    pub fn can_transition_to(&self, next: TaskStage) -> bool {
        use TaskStage::*;
        match (self, next) {
            (Done, _) | (Error, _) => false,
            (_, Error) => true,
            (Queued, Extracting) => true,
            (Extracting, Merging) | (Extracting, Queued) => true,
            (Merging, Uploading) => true,
            (Uploading, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStage::Queued => write!(f, "queued"),
            TaskStage::Extracting => write!(f, "extracting"),
            TaskStage::Merging => write!(f, "merging"),
            TaskStage::Uploading => write!(f, "uploading"),
            TaskStage::Done => write!(f, "done"),
            TaskStage::Error => write!(f, "error"),
        }
    }
}

impl FromStr for TaskStage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStage::Queued),
            "extracting" => Ok(TaskStage::Extracting),
            "merging" => Ok(TaskStage::Merging),
            "uploading" => Ok(TaskStage::Uploading),
            "done" => Ok(TaskStage::Done),
            "error" => Ok(TaskStage::Error),
            other => Err(DomainError::UnknownStage(other.to_string())),
        }
    }
}

/// 合并阶段进度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeProgress {
    pub done_segments: u32,
    pub total_segments: u32,
    pub percent: f64,
}

impl MergeProgress {
    pub fn new(done_segments: u32, total_segments: u32) -> Self {
        let done_segments = done_segments.min(total_segments);
        let percent = if total_segments == 0 {
            0.0
        } else {
            (done_segments as f64 / total_segments as f64 * 1000.0).round() / 10.0
        };
        Self {
            done_segments,
            total_segments,
            percent,
        }
    }
}

/// 进度信息，合并阶段为分段计数，上传阶段为百分比
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskProgress {
    Merge(MergeProgress),
    Upload { percent: f64 },
}

/// 任务完成后的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// 持久化文件 ID
    pub file_id: Uuid,
    /// 质量
    pub quality: String,
    /// 分片数量
    pub parts: usize,
}

/// 返回给轮询方的状态视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub status: TaskStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<TaskProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 未知阶段
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// 无效的状态转换
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: TaskStage, to: TaskStage },
}
