// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use futures::FutureExt;
use metrics::{counter, histogram};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::dispatcher::TaskRunner;
use crate::application::status_tracker::{StatusTracker, TrackerError};
use crate::config::settings::PipelineSettings;
use crate::delivery::{DeliveryFailure, DeliveryService, PartProgress};
use crate::domain::models::downloaded_file::NewDownloadedFile;
use crate::domain::models::task::{DownloadTask, MergeProgress, TaskResult, TaskStage};
use crate::domain::repositories::downloaded_file_repository::{
    DownloadedFileRepository, RepositoryError,
};
use crate::domain::services::extraction_service::{ExtractionError, ExtractionResult, Extractor};
use crate::domain::services::notifier::OperatorNotifier;
use crate::infrastructure::metrics::{
    DOWNLOADS_COMPLETED, DOWNLOADS_FAILED, DOWNLOADS_RETRIED, PIPELINE_DURATION,
};
use crate::media::{ensure_non_empty, MediaError, MediaToolkit};
use crate::queue::{QueueError, TaskQueue};

const MERGED_FILE_NAME: &str = "video.mp4";

/// 流水线错误
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction returned no result")]
    EmptyExtraction,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Merge failed: {0}")]
    Merge(#[from] MediaError),

    #[error(transparent)]
    Delivery(#[from] DeliveryFailure),

    #[error("Upload incomplete: {uploaded} of {planned} parts delivered")]
    IncompleteUpload { uploaded: usize, planned: usize },

    #[error("Could not persist file record: {0}")]
    Persist(#[from] RepositoryError),

    #[error("Status tracking failed: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Work directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// 整个任务是否可以重新入队
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::EmptyExtraction => true,
            PipelineError::Extraction(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 写入任务状态的简短原因
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::EmptyExtraction => "No downloadable stream found",
            PipelineError::Extraction(ExtractionError::Transient(_)) => {
                "Source temporarily unavailable"
            }
            PipelineError::Extraction(ExtractionError::Fatal(_)) => "Source could not be resolved",
            PipelineError::Merge(_) => "Failed to assemble the video",
            PipelineError::Delivery(_) | PipelineError::IncompleteUpload { .. } => {
                "Failed to deliver the video"
            }
            PipelineError::Persist(_) => "Failed to save the delivered video",
            PipelineError::Tracker(_)
            | PipelineError::Queue(_)
            | PipelineError::Io(_)
            | PipelineError::Panicked(_) => "Internal error",
        }
    }
}

/// 单次执行的终止结果
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed(TaskResult),
    Requeued { attempt: i64 },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_retries: i64,
    pub retry_delay: Duration,
    pub work_dir: PathBuf,
}

impl From<&PipelineSettings> for PipelineConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            max_retries: settings.max_download_retries,
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
            work_dir: PathBuf::from(&settings.work_dir),
        }
    }
}

/// 流水线执行器
///
/// 把一个任务依次推进 提取 → 合并 → 上传 → 持久化，并保证每次执行
/// 都以 完成、失败 或 重新入队 三者之一结束。合并阶段受独立的信号量约束。
pub struct PipelineExecutor {
    extractor: Arc<dyn Extractor>,
    media: Arc<dyn MediaToolkit>,
    delivery: Arc<DeliveryService>,
    files: Arc<dyn DownloadedFileRepository>,
    tracker: Arc<StatusTracker>,
    queue: Arc<dyn TaskQueue>,
    notifier: Arc<dyn OperatorNotifier>,
    merge_slots: Arc<Semaphore>,
    config: PipelineConfig,
}

impl PipelineExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor: Arc<dyn Extractor>,
        media: Arc<dyn MediaToolkit>,
        delivery: Arc<DeliveryService>,
        files: Arc<dyn DownloadedFileRepository>,
        tracker: Arc<StatusTracker>,
        queue: Arc<dyn TaskQueue>,
        notifier: Arc<dyn OperatorNotifier>,
        max_concurrent_merges: usize,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            media,
            delivery,
            files,
            tracker,
            queue,
            notifier,
            merge_slots: Arc::new(Semaphore::new(max_concurrent_merges.max(1))),
            config,
        }
    }

    /// 执行一个任务
    ///
    /// # 参数
    ///
    /// * `task` - 从队列取出的任务
    ///
    /// # 返回值
    ///
    /// 返回本次执行的终止结果；错误不会向外传播
    #[instrument(skip(self, task), fields(task_id = %task.task_id, content = %task.content_key))]
    pub async fn execute(&self, task: DownloadTask) -> PipelineOutcome {
        let started = Instant::now();
        let stages = AssertUnwindSafe(self.run_stages(&task))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(panic.as_ref()))));
        let outcome = match stages {
            Ok(result) => self.finish_success(&task, result).await,
            Err(e) if e.is_retryable() => match self.requeue(&task).await {
                Ok(Some(attempt)) => {
                    warn!("Attempt {} failed ({}), task re-enqueued", attempt, e);
                    counter!(DOWNLOADS_RETRIED).increment(1);
                    PipelineOutcome::Requeued { attempt }
                }
                Ok(None) => self.finish_failure(&task, &e).await,
                Err(requeue_error) => {
                    error!("Could not re-enqueue after '{}': {}", e, requeue_error);
                    self.finish_failure(&task, &requeue_error).await
                }
            },
            Err(e) => self.finish_failure(&task, &e).await,
        };

        self.remove_work_dir(&task.task_id).await;
        histogram!(PIPELINE_DURATION).record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn run_stages(&self, task: &DownloadTask) -> Result<TaskResult, PipelineError> {
        self.tracker
            .advance(&task.task_id, TaskStage::Extracting)
            .await?;
        let extraction = self
            .extractor
            .extract(&task.source_url, &task.variant)
            .await?
            .ok_or(PipelineError::EmptyExtraction)?;
        info!("Resolved {} stream", extraction.quality);

        self.tracker.advance(&task.task_id, TaskStage::Merging).await?;
        let work_dir = self.config.work_dir.join(&task.task_id);
        tokio::fs::create_dir_all(&work_dir).await?;
        let merged = work_dir.join(MERGED_FILE_NAME);
        self.merge(&task.task_id, &extraction, &merged).await?;
        let size = ensure_non_empty(&merged).await?;
        info!("Merged file is {} bytes", size);

        self.tracker
            .advance(&task.task_id, TaskStage::Uploading)
            .await?;
        let (tx, mut rx) = mpsc::unbounded_channel::<PartProgress>();
        let writer = {
            let tracker = self.tracker.clone();
            let task_id = task.task_id.clone();
            tokio::spawn(async move {
                while let Some(progress) = rx.recv().await {
                    if let Err(e) = tracker
                        .set_upload_progress(&task_id, progress.part_number, progress.percent)
                        .await
                    {
                        debug!("Dropped upload progress update: {}", e);
                    }
                }
            })
        };
        let delivered = self.delivery.deliver(&task.task_id, &merged, Some(&tx)).await;
        drop(tx);
        let _ = writer.await;
        let outcome = delivered?;

        if outcome.handles.is_empty() || outcome.handles.len() != outcome.planned_parts {
            return Err(PipelineError::IncompleteUpload {
                uploaded: outcome.handles.len(),
                planned: outcome.planned_parts,
            });
        }

        let saved = self
            .files
            .save_with_parts(
                NewDownloadedFile {
                    content_key: task.content_key.clone(),
                    variant: task.variant.clone(),
                    quality: extraction.quality.clone(),
                    delivery_owner: outcome.credential.clone(),
                    session_name: outcome.session_name.clone(),
                    title: extraction.title.clone(),
                    poster_url: extraction.poster_url.clone(),
                    source_url: Some(task.source_url.clone()),
                },
                &outcome.handles,
            )
            .await?;

        Ok(TaskResult {
            file_id: saved.id,
            quality: extraction.quality,
            parts: outcome.handles.len(),
        })
    }

    async fn merge(
        &self,
        task_id: &str,
        extraction: &ExtractionResult,
        output: &std::path::Path,
    ) -> Result<(), PipelineError> {
        let _permit = self
            .merge_slots
            .acquire()
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?;

        let (tx, mut rx) = watch::channel(MergeProgress::new(0, 0));
        let writer = {
            let tracker = self.tracker.clone();
            let task_id = task_id.to_string();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let progress = *rx.borrow_and_update();
                    if let Err(e) = tracker.set_merge_progress(&task_id, &progress).await {
                        debug!("Dropped merge progress update: {}", e);
                    }
                }
            })
        };

        let merged = {
            let report = move |progress: MergeProgress| {
                let _ = tx.send(progress);
            };
            self.media
                .merge(
                    &extraction.media_url,
                    &extraction.request_headers,
                    output,
                    &report,
                )
                .await
        };
        let _ = writer.await;
        merged?;
        Ok(())
    }

    /// 可重试失败后的处理
    ///
    /// 返回 `Some(attempt)` 表示已重新入队，`None` 表示重试次数耗尽
    async fn requeue(&self, task: &DownloadTask) -> Result<Option<i64>, PipelineError> {
        let attempt = self.tracker.increment_retries(&task.task_id).await?;
        if attempt > self.config.max_retries {
            return Ok(None);
        }

        tokio::time::sleep(self.config.retry_delay).await;
        self.tracker.advance(&task.task_id, TaskStage::Queued).await?;
        self.queue.enqueue(task).await?;
        Ok(Some(attempt))
    }

    async fn finish_success(&self, task: &DownloadTask, result: TaskResult) -> PipelineOutcome {
        info!(
            "Task completed: file {} in {} part(s)",
            result.file_id, result.parts
        );
        if let Err(e) = self.tracker.complete(&task.task_id, &result).await {
            error!("Failed to record completion: {}", e);
        }
        self.release(task).await;
        counter!(DOWNLOADS_COMPLETED).increment(1);
        PipelineOutcome::Completed(result)
    }

    async fn finish_failure(&self, task: &DownloadTask, e: &PipelineError) -> PipelineOutcome {
        error!("Task failed: {}", e);
        let message = e.user_message();
        if let Err(store_error) = self.tracker.fail(&task.task_id, message).await {
            error!("Failed to record failure: {}", store_error);
        }
        self.release(task).await;

        self.notifier
            .notify(&format!(
                "[{}] {}/{} failed: {}",
                task.task_id, task.content_key, task.variant, e
            ))
            .await;
        counter!(DOWNLOADS_FAILED).increment(1);
        PipelineOutcome::Failed(message.to_string())
    }

    async fn release(&self, task: &DownloadTask) {
        if let Err(e) = self.tracker.release(task).await {
            error!("Failed to release task bookkeeping: {}", e);
        }
    }

    async fn remove_work_dir(&self, task_id: &str) {
        let dir = self.config.work_dir.join(task_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl TaskRunner for PipelineExecutor {
    async fn run(&self, task: DownloadTask) {
        self.execute(task).await;
    }
}
