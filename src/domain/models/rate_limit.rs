// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// 投递客户端发出的结构化健康信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthSignal {
    /// 平台要求等待 N 秒
    FloodWait { seconds: u64 },
    /// 网络不可达
    NetworkUnreachable,
    /// 大文件上传请求超时
    UploadTimeout,
}

impl HealthSignal {
    /// 是否需要尝试代理轮换
    pub fn triggers_rotation(&self) -> bool {
        matches!(
            self,
            HealthSignal::NetworkUnreachable | HealthSignal::UploadTimeout
        )
    }
}

impl fmt::Display for HealthSignal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HealthSignal::FloodWait { seconds } => write!(f, "flood_wait({}s)", seconds),
            HealthSignal::NetworkUnreachable => write!(f, "network_unreachable"),
            HealthSignal::UploadTimeout => write!(f, "upload_timeout"),
        }
    }
}

/// 限流事件，只在内存中保留有限窗口
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEvent {
    pub observed_at: Instant,
    pub wait_seconds: u64,
}

/// 限流概况
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSummary {
    pub total_events: u64,
    pub significant_events: u64,
    pub max_wait_secs: u64,
    pub average_wait_secs: f64,
    pub events_in_window: usize,
    pub rotations: u64,
}
