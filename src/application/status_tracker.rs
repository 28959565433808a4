// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::models::task::{
    claim_key, DomainError, DownloadTask, MergeProgress, TaskProgress, TaskResult, TaskStage,
    TaskStatusView,
};
use crate::infrastructure::cache::state_store::{StateStore, StoreError};
use crate::queue::{QueueError, TaskQueue};

pub fn status_key(task_id: &str) -> String {
    format!("download:{}:status", task_id)
}

pub fn error_key(task_id: &str) -> String {
    format!("download:{}:error", task_id)
}

pub fn result_key(task_id: &str) -> String {
    format!("download:{}:result", task_id)
}

pub fn merge_progress_key(task_id: &str) -> String {
    format!("download:{}:merge_progress", task_id)
}

pub fn upload_progress_key(task_id: &str) -> String {
    format!("download:{}:upload_progress", task_id)
}

pub fn retries_key(task_id: &str) -> String {
    format!("download:{}:retries", task_id)
}

pub fn requester_active_key(requester_id: &str) -> String {
    format!("active_downloads:{}", requester_id)
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 任务状态追踪器
///
/// 每次写入都会刷新过期时间，轮询方只会看到向前推进的阶段或终止结果。
pub struct StatusTracker {
    store: Arc<dyn StateStore>,
    queue: Arc<dyn TaskQueue>,
    status_ttl: Duration,
    result_ttl: Duration,
}

impl StatusTracker {
    pub fn new(
        store: Arc<dyn StateStore>,
        queue: Arc<dyn TaskQueue>,
        status_ttl: Duration,
        result_ttl: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            status_ttl,
            result_ttl,
        }
    }

    /// 读取当前阶段
    pub async fn stage(&self, task_id: &str) -> Result<Option<TaskStage>, TrackerError> {
        match self.store.get(&status_key(task_id)).await? {
            Some(raw) => Ok(Some(TaskStage::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// 推进到下一阶段
    ///
    /// 相同阶段的重复写入只刷新过期时间；状态已过期时直接写入。
    ///
    /// # 返回值
    ///
    /// * `Err(TrackerError::Domain)` - 转换不被状态机允许
    pub async fn advance(&self, task_id: &str, next: TaskStage) -> Result<(), TrackerError> {
        if let Some(current) = self.stage(task_id).await? {
            if current != next && !current.can_transition_to(next) {
                return Err(DomainError::InvalidStateTransition {
                    from: current,
                    to: next,
                }
                .into());
            }
        }
        self.store
            .set(&status_key(task_id), &next.to_string(), Some(self.status_ttl))
            .await?;
        debug!("Task {} -> {}", task_id, next);
        Ok(())
    }

    /// 写入终止错误及面向用户的简短原因
    pub async fn fail(&self, task_id: &str, message: &str) -> Result<(), TrackerError> {
        self.store
            .set(&error_key(task_id), message, Some(self.status_ttl))
            .await?;
        self.advance(task_id, TaskStage::Error).await
    }

    /// 写入结果并标记完成
    pub async fn complete(&self, task_id: &str, result: &TaskResult) -> Result<(), TrackerError> {
        let payload = serde_json::to_string(result)?;
        self.store
            .set(&result_key(task_id), &payload, Some(self.result_ttl))
            .await?;
        self.advance(task_id, TaskStage::Done).await?;
        self.store.expire(&status_key(task_id), self.result_ttl).await?;
        Ok(())
    }

    pub async fn set_merge_progress(
        &self,
        task_id: &str,
        progress: &MergeProgress,
    ) -> Result<(), TrackerError> {
        let payload = serde_json::to_string(progress)?;
        self.store
            .set(&merge_progress_key(task_id), &payload, Some(self.status_ttl))
            .await?;
        Ok(())
    }

    pub async fn set_upload_progress(
        &self,
        task_id: &str,
        part_number: u32,
        percent: f64,
    ) -> Result<(), TrackerError> {
        let key = upload_progress_key(task_id);
        self.store
            .hset(&key, &format!("part{}", part_number), &format!("{:.0}", percent))
            .await?;
        self.store.expire(&key, self.status_ttl).await?;
        Ok(())
    }

    /// 重试计数加一，返回新值
    pub async fn increment_retries(&self, task_id: &str) -> Result<i64, TrackerError> {
        let key = retries_key(task_id);
        let count = self.store.incr(&key).await?;
        self.store.expire(&key, self.status_ttl).await?;
        Ok(count)
    }

    pub async fn retries(&self, task_id: &str) -> Result<i64, TrackerError> {
        Ok(self
            .store
            .get(&retries_key(task_id))
            .await?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }

    /// 任务进入终止状态后的清理
    ///
    /// 删除重试计数、进度，释放重复抑制占用和请求者的活跃名额。
    /// 占用只在仍归属本任务时删除。
    pub async fn release(&self, task: &DownloadTask) -> Result<(), TrackerError> {
        let task_id = task.task_id.as_str();
        self.store.del(&retries_key(task_id)).await?;
        self.store.del(&merge_progress_key(task_id)).await?;
        self.store.del(&upload_progress_key(task_id)).await?;

        let claim = claim_key(&task.requester_id, &task.content_key, &task.variant);
        if self.store.get(&claim).await?.as_deref() == Some(task_id) {
            self.store.del(&claim).await?;
        }
        self.store
            .srem(&requester_active_key(&task.requester_id), task_id)
            .await?;
        Ok(())
    }

    /// 组装返回给轮询方的状态
    ///
    /// 排队中的任务每次都重新扫描队列得到位置。
    pub async fn view(&self, task_id: &str) -> Result<Option<TaskStatusView>, TrackerError> {
        let stage = match self.stage(task_id).await? {
            Some(stage) => stage,
            None => return Ok(None),
        };

        let mut view = TaskStatusView {
            status: stage,
            queue_position: None,
            progress: None,
            result: None,
            error: None,
        };

        match stage {
            TaskStage::Queued => {
                view.queue_position = self.queue.position(task_id).await?;
            }
            TaskStage::Merging => {
                if let Some(raw) = self.store.get(&merge_progress_key(task_id)).await? {
                    match serde_json::from_str::<MergeProgress>(&raw) {
                        Ok(progress) => view.progress = Some(TaskProgress::Merge(progress)),
                        Err(e) => warn!("Ignoring malformed merge progress for {}: {}", task_id, e),
                    }
                }
            }
            TaskStage::Uploading => {
                let fields = self.store.hgetall(&upload_progress_key(task_id)).await?;
                let percent = fields
                    .values()
                    .filter_map(|raw| raw.parse::<f64>().ok())
                    .fold(None, |min: Option<f64>, value| {
                        Some(min.map_or(value, |m| m.min(value)))
                    })
                    .unwrap_or(0.0);
                view.progress = Some(TaskProgress::Upload { percent });
            }
            TaskStage::Done => {
                if let Some(raw) = self.store.get(&result_key(task_id)).await? {
                    view.result = Some(serde_json::from_str(&raw)?);
                }
            }
            TaskStage::Error => {
                view.error = self.store.get(&error_key(task_id)).await?;
            }
            TaskStage::Extracting => {}
        }

        Ok(Some(view))
    }
}
