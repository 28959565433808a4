// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use chrono::NaiveTime;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含数据库、Redis、服务器、下载流水线、投递、限流监控等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// Redis配置
    pub redis: RedisSettings,
    /// 服务器配置
    pub server: ServerSettings,
    /// 下载流水线配置
    pub pipeline: PipelineSettings,
    /// 投递配置
    pub delivery: DeliverySettings,
    /// 限流监控配置
    pub rate_limit: RateLimitSettings,
    /// 文件校验配置
    pub validator: ValidatorSettings,
    /// 提取服务配置
    pub extraction: ExtractionSettings,
    /// 运维通知配置
    pub notifier: NotifierSettings,
    /// 媒体工具配置
    pub media: MediaSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// Redis配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis连接URL
    pub url: String,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
    /// Prometheus 指标监听地址
    pub metrics_addr: String,
}

/// 下载流水线配置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// 全局最大并发下载数
    pub max_concurrent_downloads: i64,
    /// 最大并发合并数
    pub max_concurrent_merges: usize,
    /// 可重试失败的最大重新入队次数
    pub max_download_retries: i64,
    /// 重新入队前的等待（秒）
    pub retry_delay_secs: u64,
    /// 达到并发上限时的轮询间隔（秒）
    pub busy_poll_secs: u64,
    /// 队列为空时的轮询间隔（秒）
    pub idle_poll_secs: u64,
    /// 状态键过期时间（秒）
    pub status_ttl_secs: u64,
    /// 结果键过期时间（秒）
    pub result_ttl_secs: u64,
    /// 队列概况日志间隔（秒）
    pub queue_report_interval_secs: u64,
    /// 每个请求者同时进行的任务上限
    pub max_active_per_requester: i64,
    /// 临时工作目录
    pub work_dir: String,
}

/// 投递身份配置
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySettings {
    /// 身份键（会话名）
    pub key: String,
    /// 访问令牌
    pub token: String,
}

/// 外层投递凭据配置
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSettings {
    /// 凭据名称
    pub name: String,
    /// 访问令牌
    pub token: String,
    /// 投递目标
    pub destination: String,
}

/// 投递配置
#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySettings {
    /// 平台单文件大小上限（MB）
    pub size_limit_mb: u64,
    /// 单次上传超时（秒）
    pub upload_timeout_secs: u64,
    /// 单个文件上传的最大尝试次数
    pub upload_max_retries: u32,
    /// 上传重试基础间隔（秒）
    pub upload_retry_delay_secs: u64,
    /// 平台要求等待时额外附加的秒数
    pub flood_wait_buffer_secs: u64,
    /// 分片最短时长（秒）
    pub min_part_duration_secs: f64,
    /// 每日配额重置时间（UTC，HH:MM）
    pub quota_reset_time: String,
    /// 平台 API 地址
    pub api_base: String,
    /// 会话空闲回收时间（秒）
    pub session_idle_secs: u64,
    /// 会话回收检查间隔（秒）
    pub session_reap_interval_secs: u64,
    /// 上传身份池
    #[serde(default)]
    pub identities: Vec<IdentitySettings>,
    /// 外层投递凭据
    #[serde(default)]
    pub credentials: Vec<CredentialSettings>,
}

/// 限流监控配置
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// 代理轮换冷却时间（秒）
    pub rotation_cooldown_secs: u64,
    /// 检测窗口（分钟）
    pub detection_window_minutes: u64,
    /// 视为显著事件的等待秒数阈值
    pub wait_threshold_secs: u64,
    /// 窗口内显著事件数量阈值
    pub event_threshold: usize,
    /// 代理轮换接口（可选）
    pub rotation_url: Option<String>,
}

/// 文件校验配置
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorSettings {
    /// 是否启用
    pub enabled: bool,
    /// 校验周期（秒）
    pub interval_secs: u64,
    /// 每批校验数量
    pub batch_size: usize,
    /// 批次间隔（秒）
    pub batch_delay_secs: u64,
    /// 单次校验之间的最小抖动（毫秒）
    pub jitter_min_ms: u64,
    /// 单次校验之间的最大抖动（毫秒）
    pub jitter_max_ms: u64,
    /// 单次校验超时（秒）
    pub check_timeout_secs: u64,
}

/// 提取服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionSettings {
    /// 提取服务地址
    pub service_url: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

/// 运维通知配置
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierSettings {
    /// 通知 API 地址
    pub api_base: String,
    /// 通知机器人令牌
    pub bot_token: Option<String>,
    /// 通知目标会话
    pub chat_id: Option<String>,
}

/// 媒体工具配置
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    /// ffmpeg 可执行文件
    pub ffmpeg_path: String,
    /// ffprobe 可执行文件
    pub ffprobe_path: String,
}

impl PipelineSettings {
    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

impl DeliverySettings {
    /// 单文件大小上限（字节）
    pub fn size_limit_bytes(&self) -> u64 {
        self.size_limit_mb * 1024 * 1024
    }

    /// 解析每日配额重置时间
    pub fn quota_reset(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.quota_reset_time, "%H:%M").map_err(|e| {
            ConfigError::Message(format!(
                "invalid delivery.quota_reset_time '{}': {}",
                self.quota_reset_time, e
            ))
        })
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 按 `APP_ENVIRONMENT` 选择环境配置文件，支持默认值和环境变量覆盖
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::load(&env)
    }

    /// 加载指定环境的配置
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Start with default settings
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.metrics_addr", "0.0.0.0:9000")?
            .set_default("database.url", "sqlite://vidrelay.db?mode=rwc")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 2)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            // Pipeline
            .set_default("pipeline.max_concurrent_downloads", 2)?
            .set_default("pipeline.max_concurrent_merges", 3)?
            .set_default("pipeline.max_download_retries", 1)?
            .set_default("pipeline.retry_delay_secs", 10)?
            .set_default("pipeline.busy_poll_secs", 5)?
            .set_default("pipeline.idle_poll_secs", 3)?
            .set_default("pipeline.status_ttl_secs", 3600)?
            .set_default("pipeline.result_ttl_secs", 86400)?
            .set_default("pipeline.queue_report_interval_secs", 300)?
            .set_default("pipeline.max_active_per_requester", 1)?
            .set_default("pipeline.work_dir", "./downloads")?
            // Delivery
            .set_default("delivery.size_limit_mb", 1900)?
            .set_default("delivery.upload_timeout_secs", 600)?
            .set_default("delivery.upload_max_retries", 5)?
            .set_default("delivery.upload_retry_delay_secs", 5)?
            .set_default("delivery.flood_wait_buffer_secs", 5)?
            .set_default("delivery.min_part_duration_secs", 10.0)?
            .set_default("delivery.quota_reset_time", "00:00")?
            .set_default("delivery.api_base", "https://api.telegram.org")?
            .set_default("delivery.session_idle_secs", 900)?
            .set_default("delivery.session_reap_interval_secs", 300)?
            // Rate limit monitor
            .set_default("rate_limit.rotation_cooldown_secs", 30)?
            .set_default("rate_limit.detection_window_minutes", 10)?
            .set_default("rate_limit.wait_threshold_secs", 7)?
            .set_default("rate_limit.event_threshold", 7)?
            // Validator
            .set_default("validator.enabled", true)?
            .set_default("validator.interval_secs", 86400)?
            .set_default("validator.batch_size", 20)?
            .set_default("validator.batch_delay_secs", 2)?
            .set_default("validator.jitter_min_ms", 1000)?
            .set_default("validator.jitter_max_ms", 2000)?
            .set_default("validator.check_timeout_secs", 10)?
            // Collaborators
            .set_default("extraction.service_url", "http://127.0.0.1:8090/extract")?
            .set_default("extraction.timeout_secs", 60)?
            .set_default("notifier.api_base", "https://api.telegram.org")?
            .set_default("media.ffmpeg_path", "ffmpeg")?
            .set_default("media.ffprobe_path", "ffprobe")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("VIDRELAY").separator("__"));

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply_tool_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_tool_overrides(&mut self) {
        if let Ok(path) = std::env::var("FFMPEG_PATH") {
            self.media.ffmpeg_path = path;
        }
        if let Ok(path) = std::env::var("FFPROBE_PATH") {
            self.media.ffprobe_path = path;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_concurrent_downloads < 1 {
            return Err(ConfigError::Message(
                "pipeline.max_concurrent_downloads must be at least 1".to_string(),
            ));
        }
        if self.pipeline.max_concurrent_merges < 1 {
            return Err(ConfigError::Message(
                "pipeline.max_concurrent_merges must be at least 1".to_string(),
            ));
        }
        if self.delivery.size_limit_mb == 0 {
            return Err(ConfigError::Message(
                "delivery.size_limit_mb must be positive".to_string(),
            ));
        }
        if self.validator.jitter_min_ms > self.validator.jitter_max_ms {
            return Err(ConfigError::Message(
                "validator.jitter_min_ms exceeds validator.jitter_max_ms".to_string(),
            ));
        }
        self.delivery.quota_reset()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
