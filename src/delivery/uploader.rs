// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::account_pool::AccountLease;
use super::client::{DeliveryClient, DeliveryError, UploadProgressFn};
use crate::config::settings::DeliverySettings;
use crate::domain::models::rate_limit::HealthSignal;
use crate::infrastructure::metrics::UPLOAD_ATTEMPTS;
use crate::monitor::HealthReporter;
use crate::utils::retry_policy::{RetryDecision, RetryPolicy};

#[derive(Error, Debug)]
pub enum UploadError {
    /// 身份认证失败，当前身份不再使用
    #[error("Identity {identity} failed authentication: {reason}")]
    Auth { identity: String, reason: String },

    /// 重试用尽
    #[error("Upload failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// 单个文件的上传重试参数
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub attempt_timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&DeliverySettings> for UploadPolicy {
    fn from(settings: &DeliverySettings) -> Self {
        Self {
            attempt_timeout: Duration::from_secs(settings.upload_timeout_secs),
            retry: RetryPolicy {
                max_attempts: settings.upload_max_retries.max(1),
                base_delay: Duration::from_secs(settings.upload_retry_delay_secs),
                flood_wait_buffer: Duration::from_secs(settings.flood_wait_buffer_secs),
            },
        }
    }
}

/// 带重试的单文件上传器
///
/// 每次尝试都有硬超时；网络与超时失败会上报健康信号，
/// 认证失败立即返回，由调用方换身份。
pub struct Uploader {
    client: Arc<dyn DeliveryClient>,
    reporter: HealthReporter,
    policy: UploadPolicy,
}

impl Uploader {
    pub fn new(client: Arc<dyn DeliveryClient>, reporter: HealthReporter, policy: UploadPolicy) -> Self {
        Self {
            client,
            reporter,
            policy,
        }
    }

    /// 以租用的身份上传一个文件
    ///
    /// # 参数
    ///
    /// * `lease` - 已占用的上传身份
    /// * `destination` - 外层凭据的接收目标
    /// * `path` - 待上传文件
    /// * `progress` - 上传进度回调
    ///
    /// # 返回值
    ///
    /// * `Ok(String)` - 平台文件句柄
    /// * `Err(UploadError)` - 认证失败或重试用尽
    pub async fn upload_with_retry(
        &self,
        lease: &AccountLease,
        destination: &str,
        path: &Path,
        progress: UploadProgressFn<'_>,
    ) -> Result<String, UploadError> {
        let identity = lease.identity();
        let max_attempts = self.policy.retry.max_attempts;
        let mut last_error = DeliveryError::Unknown("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            info!(
                "Upload attempt {}/{} of {} via {}",
                attempt,
                max_attempts,
                path.display(),
                identity.key
            );

            let outcome = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.client.send_file(identity, destination, path, progress),
            )
            .await
            .unwrap_or(Err(DeliveryError::Timeout));

            let error = match outcome {
                Ok(handle) => {
                    counter!(UPLOAD_ATTEMPTS, "outcome" => "success").increment(1);
                    return Ok(handle);
                }
                Err(error) => error,
            };
            counter!(UPLOAD_ATTEMPTS, "outcome" => error.kind()).increment(1);
            self.report(&error);

            match self.policy.retry.decide(&error, attempt) {
                RetryDecision::Abort => {
                    warn!("Identity {} rejected: {}", identity.key, error);
                    return Err(UploadError::Auth {
                        identity: identity.key.clone(),
                        reason: error.to_string(),
                    });
                }
                RetryDecision::GiveUp => {
                    last_error = error;
                    break;
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "Upload attempt {} via {} failed ({}), retrying in {:?}",
                        attempt, identity.key, error, delay
                    );
                    last_error = error;
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(UploadError::Exhausted {
            attempts: max_attempts,
            last_error: last_error.to_string(),
        })
    }

    fn report(&self, error: &DeliveryError) {
        let signal = match error {
            DeliveryError::FloodWait { seconds } => HealthSignal::FloodWait { seconds: *seconds },
            DeliveryError::Network(_) => HealthSignal::NetworkUnreachable,
            DeliveryError::Timeout => HealthSignal::UploadTimeout,
            _ => return,
        };
        self.reporter.report(signal);
    }
}
