// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::config::settings::NotifierSettings;
use crate::domain::services::notifier::OperatorNotifier;

/// 通过机器人消息接口发送运维通知
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl HttpNotifier {
    pub fn new(api_base: &str, bot_token: &str, chat_id: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token
            ),
            chat_id: chat_id.to_string(),
        }
    }
}

#[async_trait]
impl OperatorNotifier for HttpNotifier {
    async fn notify(&self, text: &str) {
        let result = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .and_then(|response| response.error_for_status());

        if let Err(e) = result {
            error!("Failed to notify operator: {}", e);
        }
    }
}

/// 未配置通知渠道时只写日志
pub struct LogNotifier;

#[async_trait]
impl OperatorNotifier for LogNotifier {
    async fn notify(&self, text: &str) {
        warn!(target: "operator", "{}", text);
    }
}

/// 根据配置选择通知实现
pub fn build_notifier(settings: &NotifierSettings) -> Arc<dyn OperatorNotifier> {
    match (&settings.bot_token, &settings.chat_id) {
        (Some(token), Some(chat_id)) => {
            Arc::new(HttpNotifier::new(&settings.api_base, token, chat_id))
        }
        _ => Arc::new(LogNotifier),
    }
}
