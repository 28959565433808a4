// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::proxy_rotator::ProxyRotator;
use crate::config::settings::RateLimitSettings;
use crate::domain::models::rate_limit::{HealthSignal, RateLimitEvent, RateLimitSummary};
use crate::domain::services::notifier::OperatorNotifier;
use crate::infrastructure::metrics::{PROXY_ROTATIONS, RATE_LIMIT_EVENTS};

/// 健康信号上报端
///
/// 投递客户端包装层持有它，把结构化信号发给监控器。
#[derive(Clone)]
pub struct HealthReporter {
    tx: mpsc::UnboundedSender<HealthSignal>,
}

impl HealthReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HealthSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 没有监控器消费时使用，信号直接丢弃
    pub fn disabled() -> Self {
        Self::channel().0
    }

    pub fn report(&self, signal: HealthSignal) {
        if self.tx.send(signal).is_err() {
            debug!("Health signal {} dropped: monitor not running", signal);
        }
    }
}

/// 监控器配置
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 两次轮换之间的最短间隔
    pub rotation_cooldown: Duration,
    /// 趋势统计窗口
    pub detection_window: Duration,
    /// 视为显著事件的等待秒数
    pub wait_threshold_secs: u64,
    /// 窗口内显著事件达到该数量时通知运维
    pub event_threshold: usize,
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            rotation_cooldown: Duration::from_secs(settings.rotation_cooldown_secs),
            detection_window: Duration::from_secs(settings.detection_window_minutes * 60),
            wait_threshold_secs: settings.wait_threshold_secs,
            event_threshold: settings.event_threshold,
        }
    }
}

#[derive(Default)]
struct EventLog {
    window: VecDeque<RateLimitEvent>,
    total_events: u64,
    significant_events: u64,
    total_wait_secs: u64,
    max_wait_secs: u64,
    last_alert: Option<Instant>,
}

impl EventLog {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.window.front() {
            if now.duration_since(front.observed_at) > window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Default)]
struct RotationState {
    in_flight: bool,
    last_rotation: Option<Instant>,
}

/// 轮换结束时清除在途标记，包括 panic 与取消
struct InFlightGuard<'a>(&'a Mutex<RotationState>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().in_flight = false;
    }
}

/// 限流与网络健康监控器
///
/// 限流信号只做趋势记录；网络不可达和上传超时信号会尝试轮换代理，
/// 受全局冷却时间和单一在途保护约束，一次突发最多触发一次轮换。
pub struct RateLimitMonitor {
    config: RateLimitConfig,
    rotator: Arc<dyn ProxyRotator>,
    notifier: Arc<dyn OperatorNotifier>,
    log: Mutex<EventLog>,
    rotation: Mutex<RotationState>,
    rotations: AtomicU64,
}

impl RateLimitMonitor {
    pub fn new(
        config: RateLimitConfig,
        rotator: Arc<dyn ProxyRotator>,
        notifier: Arc<dyn OperatorNotifier>,
    ) -> Self {
        Self {
            config,
            rotator,
            notifier,
            log: Mutex::new(EventLog::default()),
            rotation: Mutex::new(RotationState::default()),
            rotations: AtomicU64::new(0),
        }
    }

    /// 启动信号消费循环
    ///
    /// 轮换在独立任务中执行，消费循环不会被轮换请求阻塞。
    pub fn spawn(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<HealthSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Rate-limit monitor started");
            while let Some(signal) = rx.recv().await {
                if signal.triggers_rotation() {
                    let monitor = self.clone();
                    tokio::spawn(async move {
                        monitor.handle(signal).await;
                    });
                } else {
                    self.handle(signal).await;
                }
            }
            info!("Rate-limit monitor stopped");
        })
    }

    /// 处理一条健康信号
    pub async fn handle(&self, signal: HealthSignal) {
        match signal {
            HealthSignal::FloodWait { seconds } => {
                if let Some(count) = self.record_flood_wait(seconds) {
                    self.notifier
                        .notify(&format!(
                            "Rate limiting: {} flood waits of at least {}s in the last {} minutes",
                            count,
                            self.config.wait_threshold_secs,
                            self.config.detection_window.as_secs() / 60
                        ))
                        .await;
                }
            }
            HealthSignal::NetworkUnreachable | HealthSignal::UploadTimeout => {
                debug!("Rotation signal received: {}", signal);
                self.try_rotate().await;
            }
        }
    }

    /// 记录一次限流事件
    ///
    /// # 返回值
    ///
    /// 需要通知运维时返回窗口内显著事件数
    fn record_flood_wait(&self, seconds: u64) -> Option<usize> {
        counter!(RATE_LIMIT_EVENTS).increment(1);
        let now = Instant::now();
        let mut log = self.log.lock();

        log.total_events += 1;
        log.total_wait_secs += seconds;
        log.max_wait_secs = log.max_wait_secs.max(seconds);
        log.window.push_back(RateLimitEvent {
            observed_at: now,
            wait_seconds: seconds,
        });
        log.prune(now, self.config.detection_window);

        if seconds < self.config.wait_threshold_secs {
            return None;
        }
        log.significant_events += 1;
        warn!("Flood wait of {}s reported by delivery platform", seconds);

        let significant = log
            .window
            .iter()
            .filter(|event| event.wait_seconds >= self.config.wait_threshold_secs)
            .count();
        if significant < self.config.event_threshold {
            return None;
        }

        let alerted_recently = match log.last_alert {
            Some(at) => now.duration_since(at) < self.config.detection_window,
            None => false,
        };
        if alerted_recently {
            return None;
        }
        log.last_alert = Some(now);
        Some(significant)
    }

    /// 尝试轮换代理
    ///
    /// 冷却时间从上一次触发时刻算起，失败的轮换同样计入。
    ///
    /// # 返回值
    ///
    /// 本次调用是否实际触发了轮换
    pub async fn try_rotate(&self) -> bool {
        {
            let mut state = self.rotation.lock();
            if state.in_flight {
                debug!("Rotation already in flight, skipping");
                return false;
            }
            let now = Instant::now();
            if let Some(last) = state.last_rotation {
                if now.duration_since(last) < self.config.rotation_cooldown {
                    debug!("Rotation cooling down, skipping");
                    return false;
                }
            }
            state.in_flight = true;
            state.last_rotation = Some(now);
        }
        let _guard = InFlightGuard(&self.rotation);

        self.rotations.fetch_add(1, Ordering::Relaxed);
        counter!(PROXY_ROTATIONS).increment(1);
        info!("Rotating outbound proxy");

        if let Err(e) = self.rotator.rotate().await {
            error!("Proxy rotation failed: {}", e);
        }
        true
    }

    /// 当前限流概况
    pub fn summary(&self) -> RateLimitSummary {
        let mut log = self.log.lock();
        log.prune(Instant::now(), self.config.detection_window);

        let average_wait_secs = if log.total_events == 0 {
            0.0
        } else {
            log.total_wait_secs as f64 / log.total_events as f64
        };

        RateLimitSummary {
            total_events: log.total_events,
            significant_events: log.significant_events,
            max_wait_secs: log.max_wait_secs,
            average_wait_secs,
            events_in_window: log.window.len(),
            rotations: self.rotations.load(Ordering::Relaxed),
        }
    }
}
