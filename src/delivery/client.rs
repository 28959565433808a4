// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::config::settings::{CredentialSettings, IdentitySettings};

/// 投递平台返回的类型化失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// 网络或连接失败，可重试
    #[error("Network error: {0}")]
    Network(String),

    /// 单次请求超时，可重试
    #[error("Request timed out")]
    Timeout,

    /// 平台要求等待指定秒数
    #[error("Flood wait requested: {seconds}s")]
    FloodWait { seconds: u64 },

    /// 身份认证或会话失效，不在同一身份上重试
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 平台明确拒绝了文件句柄
    #[error("Invalid file handle: {0}")]
    InvalidHandle(String),

    #[error("Delivery failed: {0}")]
    Unknown(String),
}

impl DeliveryError {
    /// 用于指标标签的短名称
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Network(_) => "network",
            DeliveryError::Timeout => "timeout",
            DeliveryError::FloodWait { .. } => "flood_wait",
            DeliveryError::Auth(_) => "auth",
            DeliveryError::InvalidHandle(_) => "invalid_handle",
            DeliveryError::Unknown(_) => "unknown",
        }
    }
}

/// 文件句柄检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    Valid,
    Expired,
}

/// 上传进度回调：(已发送字节, 总字节)
pub type UploadProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// 一个可以向平台推送文件的上传身份
#[derive(Clone, PartialEq, Eq)]
pub struct DeliveryIdentity {
    pub key: String,
    pub token: String,
}

impl fmt::Debug for DeliveryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryIdentity")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl From<&IdentitySettings> for DeliveryIdentity {
    fn from(settings: &IdentitySettings) -> Self {
        Self {
            key: settings.key.clone(),
            token: settings.token.clone(),
        }
    }
}

/// 外层投递凭据：文件最终归属的机器人及其接收目标
#[derive(Clone, PartialEq, Eq)]
pub struct DeliveryCredential {
    pub name: String,
    pub token: String,
    pub destination: String,
}

impl fmt::Debug for DeliveryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryCredential")
            .field("name", &self.name)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl From<&CredentialSettings> for DeliveryCredential {
    fn from(settings: &CredentialSettings) -> Self {
        Self {
            name: settings.name.clone(),
            token: settings.token.clone(),
            destination: settings.destination.clone(),
        }
    }
}

/// 投递平台客户端契约
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// 以 `identity` 身份把文件发送到 `destination`
    ///
    /// # 返回值
    ///
    /// * `Ok(String)` - 平台分配的文件句柄
    /// * `Err(DeliveryError)` - 类型化失败
    async fn send_file(
        &self,
        identity: &DeliveryIdentity,
        destination: &str,
        path: &Path,
        progress: UploadProgressFn<'_>,
    ) -> Result<String, DeliveryError>;

    /// 用外层凭据检查句柄是否仍然有效
    async fn check_handle(
        &self,
        credential_token: &str,
        handle: &str,
    ) -> Result<HandleStatus, DeliveryError>;
}
