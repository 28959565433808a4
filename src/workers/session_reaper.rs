// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::settings::DeliverySettings;
use crate::delivery::HttpDeliveryClient;

/// 空闲上传会话回收器
pub struct SessionReaper {
    client: Arc<HttpDeliveryClient>,
    max_idle: Duration,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(client: Arc<HttpDeliveryClient>, settings: &DeliverySettings) -> Self {
        Self {
            client,
            max_idle: Duration::from_secs(settings.session_idle_secs),
            interval: Duration::from_secs(settings.session_reap_interval_secs),
        }
    }

    /// 运行回收器
    pub async fn run(&self) {
        info!(
            "Session reaper started (idle limit {}s)",
            self.max_idle.as_secs()
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;
            let closed = self.client.evict_idle(self.max_idle);
            debug!(
                "Reaped {} sessions, {} still open",
                closed,
                self.client.session_count()
            );
        }
    }

    /// 启动后台运行
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }
}
