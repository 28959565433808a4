// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::dispatcher::Dispatcher;
use super::file_validator::FileValidator;
use super::session_reaper::SessionReaper;
use crate::domain::models::rate_limit::HealthSignal;
use crate::monitor::RateLimitMonitor;

/// 工作管理器
///
/// 持有所有后台循环的句柄，收到关闭信号后统一中止
#[derive(Default)]
pub struct WorkerManager {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动调度循环
    pub fn start_dispatcher(&mut self, dispatcher: Dispatcher) {
        self.handles.push(dispatcher.start());
    }

    /// 启动句柄校验器
    pub fn start_validator(&mut self, validator: FileValidator) {
        self.handles.push(validator.start());
    }

    /// 启动会话回收器
    pub fn start_session_reaper(&mut self, reaper: SessionReaper) {
        self.handles.push(reaper.start());
    }

    /// 启动限流监控
    ///
    /// # 参数
    ///
    /// * `monitor` - 监控器
    /// * `signals` - 上传路径上报健康信号的接收端
    pub fn start_monitor(
        &mut self,
        monitor: Arc<RateLimitMonitor>,
        signals: mpsc::UnboundedReceiver<HealthSignal>,
    ) {
        self.handles.push(monitor.spawn(signals));
    }

    /// 正在运行的后台循环数
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// 中止所有后台循环
    pub fn shutdown(&mut self) {
        info!("Shutting down workers...");
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("Workers shut down successfully");
    }

    /// 等待关闭信号并关闭工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        self.shutdown();
    }
}
