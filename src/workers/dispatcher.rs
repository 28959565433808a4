// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::settings::PipelineSettings;
use crate::domain::models::task::DownloadTask;
use crate::infrastructure::cache::state_store::{StateStore, StoreError};
use crate::infrastructure::metrics::{DOWNLOADS_ACTIVE, QUEUE_LENGTH};
use crate::queue::TaskQueue;

/// 全局活跃下载计数的键
pub const ACTIVE_DOWNLOADS_KEY: &str = "active_downloads";

/// 执行单个任务直到终止结果
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: DownloadTask);
}

/// 调度循环配置
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_concurrent: i64,
    pub busy_poll: Duration,
    pub idle_poll: Duration,
    pub report_interval: Duration,
}

impl From<&PipelineSettings> for DispatcherConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent_downloads,
            busy_poll: Duration::from_secs(settings.busy_poll_secs),
            idle_poll: Duration::from_secs(settings.idle_poll_secs),
            report_interval: Duration::from_secs(settings.queue_report_interval_secs),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Tick {
    Busy,
    Idle,
    Dispatched,
}

/// 准入控制的调度循环
///
/// 每轮都重新读取权威计数；未满时弹出队首任务，先加计数再启动，
/// 任务结束（包括 panic）后减计数。循环本身永不因任务失败退出。
pub struct Dispatcher {
    store: Arc<dyn StateStore>,
    queue: Arc<dyn TaskQueue>,
    runner: Arc<dyn TaskRunner>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn StateStore>,
        queue: Arc<dyn TaskQueue>,
        runner: Arc<dyn TaskRunner>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            queue,
            runner,
            config,
        }
    }

    /// 运行调度循环
    pub async fn run(&self) {
        info!(
            "Download dispatcher started (max {} concurrent)",
            self.config.max_concurrent
        );

        // Counts left by a previous process are stale
        if let Err(e) = self.store.set(ACTIVE_DOWNLOADS_KEY, "0", None).await {
            error!("Failed to reset active download counter: {}", e);
        }

        let mut last_report = Instant::now();
        loop {
            let tick = match self.tick().await {
                Ok(tick) => tick,
                Err(e) => {
                    error!("Dispatcher iteration failed: {}", e);
                    Tick::Idle
                }
            };

            if last_report.elapsed() >= self.config.report_interval {
                self.report().await;
                last_report = Instant::now();
            }

            match tick {
                Tick::Busy => tokio::time::sleep(self.config.busy_poll).await,
                Tick::Idle => tokio::time::sleep(self.config.idle_poll).await,
                Tick::Dispatched => {}
            }
        }
    }

    /// 启动后台运行
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn tick(&self) -> Result<Tick, Box<dyn std::error::Error + Send + Sync>> {
        let active = self.active_count().await?;
        gauge!(DOWNLOADS_ACTIVE).set(active as f64);
        if active >= self.config.max_concurrent {
            return Ok(Tick::Busy);
        }

        let task = match self.queue.dequeue().await? {
            Some(task) => task,
            None => return Ok(Tick::Idle),
        };

        if let Err(e) = self.store.incr(ACTIVE_DOWNLOADS_KEY).await {
            error!("Could not reserve a slot for {}: {}", task.task_id, e);
            if let Err(e) = self.queue.enqueue(&task).await {
                error!("Task {} lost after slot failure: {}", task.task_id, e);
            }
            return Err(e.into());
        }

        info!(
            "Dispatching task {} ({}/{})",
            task.task_id, task.content_key, task.variant
        );
        self.launch(task);
        Ok(Tick::Dispatched)
    }

    fn launch(&self, task: DownloadTask) {
        let store = self.store.clone();
        let runner = self.runner.clone();

        tokio::spawn(async move {
            let task_id = task.task_id.clone();
            let pipeline = tokio::spawn(async move { runner.run(task).await });

            if let Err(e) = pipeline.await {
                error!("Pipeline for task {} aborted: {}", task_id, e);
            }

            match store.decr(ACTIVE_DOWNLOADS_KEY).await {
                Ok(active) => {
                    debug!("Task {} released its slot ({} active)", task_id, active);
                    gauge!(DOWNLOADS_ACTIVE).set(active as f64);
                }
                Err(e) => error!("Failed to release slot for {}: {}", task_id, e),
            }
        });
    }

    async fn active_count(&self) -> Result<i64, StoreError> {
        Ok(self
            .store
            .get(ACTIVE_DOWNLOADS_KEY)
            .await?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }

    async fn report(&self) {
        let queued = self.queue.len().await.unwrap_or(0);
        let active = self.active_count().await.unwrap_or(0);
        gauge!(QUEUE_LENGTH).set(queued as f64);
        info!(
            "Queue report: {} waiting, {} active, limit {}",
            queued, active, self.config.max_concurrent
        );
    }
}
