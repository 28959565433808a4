// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::models::task::DownloadTask;
use crate::infrastructure::cache::state_store::{StateStore, StoreError};

/// 队列在临时存储中的键
pub const DOWNLOAD_QUEUE_KEY: &str = "download_queue";

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 存储错误
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 任务队列特质
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 追加到队尾
    ///
    /// # 返回值
    ///
    /// 任务在队列中从 1 开始的位置
    async fn enqueue(&self, task: &DownloadTask) -> Result<usize, QueueError>;

    /// 弹出队首任务
    async fn dequeue(&self) -> Result<Option<DownloadTask>, QueueError>;

    /// 线性扫描得到任务当前位置，不在队列中时返回 `None`
    async fn position(&self, task_id: &str) -> Result<Option<usize>, QueueError>;

    /// 队列长度
    async fn len(&self) -> Result<usize, QueueError>;
}

#[derive(Deserialize)]
struct QueuedId {
    task_id: String,
}

/// 基于临时存储列表的任务队列
pub struct StoreTaskQueue {
    store: Arc<dyn StateStore>,
}

impl StoreTaskQueue {
    /// 创建新的队列实例
    ///
    /// # 参数
    ///
    /// * `store` - 临时存储
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn scan(entries: &[String], task_id: &str) -> Option<usize> {
        entries
            .iter()
            .position(|raw| {
                serde_json::from_str::<QueuedId>(raw)
                    .map(|queued| queued.task_id == task_id)
                    .unwrap_or(false)
            })
            .map(|index| index + 1)
    }
}

#[async_trait]
impl TaskQueue for StoreTaskQueue {
    async fn enqueue(&self, task: &DownloadTask) -> Result<usize, QueueError> {
        let payload = serde_json::to_string(task)?;
        let length = self.store.rpush(DOWNLOAD_QUEUE_KEY, &payload).await?;
        let fallback = length.max(1) as usize;

        // The task is queued once RPUSH succeeds; the scan only refines the position
        let position = match self.store.lrange(DOWNLOAD_QUEUE_KEY).await {
            Ok(entries) => Self::scan(&entries, &task.task_id).unwrap_or(fallback),
            Err(e) => {
                warn!("Position scan failed for {}: {}", task.task_id, e);
                fallback
            }
        };
        debug!("Task {} enqueued at position {}", task.task_id, position);
        Ok(position)
    }

    async fn dequeue(&self) -> Result<Option<DownloadTask>, QueueError> {
        while let Some(raw) = self.store.lpop(DOWNLOAD_QUEUE_KEY).await? {
            match serde_json::from_str::<DownloadTask>(&raw) {
                Ok(task) => return Ok(Some(task)),
                Err(e) => error!("Dropping malformed queue entry: {}", e),
            }
        }
        Ok(None)
    }

    async fn position(&self, task_id: &str) -> Result<Option<usize>, QueueError> {
        let entries = self.store.lrange(DOWNLOAD_QUEUE_KEY).await?;
        Ok(Self::scan(&entries, task_id))
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.store.llen(DOWNLOAD_QUEUE_KEY).await?)
    }
}
