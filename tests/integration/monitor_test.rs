// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::helpers::fakes::RecordingNotifier;
use vidrelay::domain::models::rate_limit::HealthSignal;
use vidrelay::monitor::{HealthReporter, ProxyRotator, RateLimitConfig, RateLimitMonitor, RotationError};

#[derive(Default)]
struct CountingRotator {
    rotations: AtomicUsize,
}

#[async_trait]
impl ProxyRotator for CountingRotator {
    async fn rotate(&self) -> Result<(), RotationError> {
        self.rotations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

fn config() -> RateLimitConfig {
    RateLimitConfig {
        rotation_cooldown: Duration::from_secs(30),
        detection_window: Duration::from_secs(600),
        wait_threshold_secs: 7,
        event_threshold: 3,
    }
}

/// 测试信号经由通道到达监控器
///
/// 一批网络不可达信号在冷却期内只触发一次轮换；冷却期过后的单个信号再触发一次。
#[tokio::test(start_paused = true)]
async fn test_signal_burst_through_channel() {
    let rotator = Arc::new(CountingRotator::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = Arc::new(RateLimitMonitor::new(config(), rotator.clone(), notifier));
    let (reporter, rx) = HealthReporter::channel();
    let handle = monitor.clone().spawn(rx);

    for _ in 0..20 {
        reporter.report(HealthSignal::NetworkUnreachable);
        reporter.report(HealthSignal::UploadTimeout);
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(rotator.rotations.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    reporter.report(HealthSignal::NetworkUnreachable);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(rotator.rotations.load(Ordering::SeqCst), 2);

    handle.abort();
}

/// 测试限流事件只用于统计，不触发轮换
#[tokio::test(start_paused = true)]
async fn test_flood_waits_are_reported_not_rotated() {
    let rotator = Arc::new(CountingRotator::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = Arc::new(RateLimitMonitor::new(config(), rotator.clone(), notifier.clone()));

    for seconds in [3, 10, 20, 40] {
        monitor.handle(HealthSignal::FloodWait { seconds }).await;
    }

    let summary = monitor.summary();
    assert_eq!(summary.total_events, 4);
    assert_eq!(summary.significant_events, 3);
    assert_eq!(summary.max_wait_secs, 40);
    assert_eq!(summary.events_in_window, 4);
    assert_eq!(rotator.rotations.load(Ordering::SeqCst), 0);
    assert_eq!(notifier.messages().len(), 1);
}
