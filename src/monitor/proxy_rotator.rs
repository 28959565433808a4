// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::settings::RateLimitSettings;

#[derive(Error, Debug)]
pub enum RotationError {
    #[error("Rotation request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// 更换出站网络身份的动作
#[async_trait]
pub trait ProxyRotator: Send + Sync {
    async fn rotate(&self) -> Result<(), RotationError>;
}

/// 调用代理服务商提供的轮换地址
pub struct HttpProxyRotator {
    client: reqwest::Client,
    rotation_url: String,
}

impl HttpProxyRotator {
    pub fn new(rotation_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            rotation_url: rotation_url.into(),
        }
    }
}

#[async_trait]
impl ProxyRotator for HttpProxyRotator {
    async fn rotate(&self) -> Result<(), RotationError> {
        self.client
            .get(&self.rotation_url)
            .send()
            .await?
            .error_for_status()?;
        info!("Proxy rotation requested");
        Ok(())
    }
}

/// 未配置轮换地址时使用
pub struct NoopRotator;

#[async_trait]
impl ProxyRotator for NoopRotator {
    async fn rotate(&self) -> Result<(), RotationError> {
        debug!("Proxy rotation skipped: no rotation url configured");
        Ok(())
    }
}

pub fn build_rotator(settings: &RateLimitSettings) -> Arc<dyn ProxyRotator> {
    match settings.rotation_url.as_deref() {
        Some(url) if !url.is_empty() => Arc::new(HttpProxyRotator::new(url)),
        _ => Arc::new(NoopRotator),
    }
}
