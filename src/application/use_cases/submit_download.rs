// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::dto::download_request::{SubmitDownloadRequest, SubmitDownloadResponse};
use crate::application::status_tracker::{requester_active_key, status_key, StatusTracker, TrackerError};
use crate::domain::models::task::{DownloadTask, TaskStage};
use crate::infrastructure::cache::state_store::{StateStore, StoreError};
use crate::infrastructure::metrics::DOWNLOADS_SUBMITTED;
use crate::queue::{QueueError, TaskQueue};

#[derive(Error, Debug)]
pub enum SubmitError {
    /// 请求者活跃任务数已达上限
    #[error("Requester {0} already has the maximum number of active downloads")]
    LimitReached(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Status error: {0}")]
    Tracker(#[from] TrackerError),
}

/// 提交下载任务用例
///
/// 用一次条件写入占用 (请求者, 内容, 变体)，占用失败说明已有同一任务在进行，
/// 直接返回已有任务；占用成功后检查请求者活跃名额并入队。
pub struct SubmitDownloadUseCase {
    store: Arc<dyn StateStore>,
    queue: Arc<dyn TaskQueue>,
    tracker: Arc<StatusTracker>,
    claim_ttl: Duration,
    max_active_per_requester: i64,
}

impl SubmitDownloadUseCase {
    pub fn new(
        store: Arc<dyn StateStore>,
        queue: Arc<dyn TaskQueue>,
        tracker: Arc<StatusTracker>,
        claim_ttl: Duration,
        max_active_per_requester: i64,
    ) -> Self {
        Self {
            store,
            queue,
            tracker,
            claim_ttl,
            max_active_per_requester,
        }
    }

    /// 执行提交
    ///
    /// # 参数
    ///
    /// * `request` - 已校验的提交请求
    ///
    /// # 返回值
    ///
    /// * `Ok(SubmitDownloadResponse)` - 新任务及其队列位置，或已有任务
    /// * `Err(SubmitError)` - 名额不足或存储不可用
    pub async fn execute(
        &self,
        request: SubmitDownloadRequest,
    ) -> Result<SubmitDownloadResponse, SubmitError> {
        let task = DownloadTask::new(
            request.source_url,
            request.content_key,
            request.variant,
            request.requester_id,
        );
        let claim = task.claim_key();

        // The claim can expire between a failed SET NX and the GET, so try twice
        let mut claimed = false;
        for _ in 0..2 {
            if self.store.set_nx(&claim, &task.task_id, self.claim_ttl).await? {
                claimed = true;
                break;
            }
            if let Some(existing) = self.store.get(&claim).await? {
                info!(
                    "Duplicate submission for {}/{} by {}, returning task {}",
                    task.content_key, task.variant, task.requester_id, existing
                );
                let view = self.tracker.view(&existing).await?;
                return Ok(SubmitDownloadResponse::existing(existing, view));
            }
        }
        if !claimed {
            return Err(StoreError::Unavailable("could not claim submission".to_string()).into());
        }

        let active_key = requester_active_key(&task.requester_id);
        let active = match self.store.sadd(&active_key, &task.task_id).await {
            Ok(active) => active,
            Err(e) => {
                self.rollback(&task, false).await;
                return Err(e.into());
            }
        };
        // Members of tasks lost mid-run must not hold the requester's slot forever
        if let Err(e) = self.store.expire(&active_key, self.claim_ttl).await {
            self.rollback(&task, true).await;
            return Err(e.into());
        }
        if active > self.max_active_per_requester {
            self.rollback(&task, true).await;
            warn!(
                "Requester {} rejected: {} active downloads",
                task.requester_id,
                active - 1
            );
            return Err(SubmitError::LimitReached(task.requester_id));
        }

        let queued = async {
            self.tracker.advance(&task.task_id, TaskStage::Queued).await?;
            let position = self.queue.enqueue(&task).await?;
            Ok::<usize, SubmitError>(position)
        }
        .await;

        match queued {
            Ok(position) => {
                counter!(DOWNLOADS_SUBMITTED).increment(1);
                info!(
                    "Task {} queued at position {} for {}/{}",
                    task.task_id, position, task.content_key, task.variant
                );
                Ok(SubmitDownloadResponse::accepted(task.task_id, position))
            }
            Err(e) => {
                self.rollback(&task, true).await;
                Err(e)
            }
        }
    }

    /// 撤销部分完成的提交，尽力而为
    async fn rollback(&self, task: &DownloadTask, joined_active_set: bool) {
        if joined_active_set {
            let _ = self
                .store
                .srem(&requester_active_key(&task.requester_id), &task.task_id)
                .await;
        }
        let _ = self.store.del(&task.claim_key()).await;
        let _ = self.store.del(&status_key(&task.task_id)).await;
    }
}
