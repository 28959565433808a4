// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

use crate::delivery::client::DeliveryError;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 基础等待时间，按尝试序号线性放大
    pub base_delay: Duration,
    /// 平台要求等待后额外追加的时间
    pub flood_wait_buffer: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            flood_wait_buffer: Duration::from_secs(5),
        }
    }
}

/// 一次失败之后的处理决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待后重试
    RetryAfter(Duration),
    /// 立即放弃当前身份，不再重试
    Abort,
    /// 重试次数已用尽
    GiveUp,
}

impl RetryPolicy {
    /// 计算第 `attempt` 次失败后的等待时间
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.max(1)
    }

    /// 是否还有剩余尝试次数
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// 根据失败类型决定下一步
    ///
    /// 认证失败立即放弃；限流按平台要求的秒数加缓冲等待；
    /// 其他失败（网络、超时、未知）按线性退避重试。
    pub fn decide(&self, error: &DeliveryError, attempt: u32) -> RetryDecision {
        if matches!(error, DeliveryError::Auth(_)) {
            return RetryDecision::Abort;
        }
        if !self.should_retry(attempt) {
            return RetryDecision::GiveUp;
        }
        match error {
            DeliveryError::FloodWait { seconds } => {
                RetryDecision::RetryAfter(Duration::from_secs(*seconds) + self.flood_wait_buffer)
            }
            _ => RetryDecision::RetryAfter(self.calculate_backoff(attempt)),
        }
    }
}
