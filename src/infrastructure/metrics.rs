// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

pub const DOWNLOADS_SUBMITTED: &str = "downloads_submitted_total";
pub const DOWNLOADS_COMPLETED: &str = "downloads_completed_total";
pub const DOWNLOADS_FAILED: &str = "downloads_failed_total";
pub const DOWNLOADS_RETRIED: &str = "downloads_retried_total";
pub const DOWNLOADS_ACTIVE: &str = "downloads_active";
pub const QUEUE_LENGTH: &str = "download_queue_length";
pub const UPLOAD_ATTEMPTS: &str = "upload_attempts_total";
pub const PROXY_ROTATIONS: &str = "proxy_rotations_total";
pub const RATE_LIMIT_EVENTS: &str = "rate_limit_events_total";
pub const EXPIRED_FILES_CLEANED: &str = "expired_files_cleaned_total";
pub const PIPELINE_DURATION: &str = "pipeline_duration_seconds";

/// 初始化指标系统
///
/// 安装 Prometheus 导出器并注册指标说明
pub fn init_metrics(addr: &str) {
    let addr: SocketAddr = match addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}. Metrics exporter disabled.", addr, e);
            return;
        }
    };

    // Ignore error if address is already in use (for development/testing)
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_counter!(DOWNLOADS_SUBMITTED, "Download tasks accepted into the queue");
    describe_counter!(DOWNLOADS_COMPLETED, "Download tasks that reached done");
    describe_counter!(DOWNLOADS_FAILED, "Download tasks that reached error");
    describe_counter!(DOWNLOADS_RETRIED, "Download tasks re-enqueued after a retryable failure");
    describe_gauge!(DOWNLOADS_ACTIVE, "Pipelines currently holding a worker slot");
    describe_gauge!(QUEUE_LENGTH, "Tasks waiting in the download queue");
    describe_counter!(UPLOAD_ATTEMPTS, "Upload attempts by outcome");
    describe_counter!(PROXY_ROTATIONS, "Proxy rotations triggered by health signals");
    describe_counter!(RATE_LIMIT_EVENTS, "Flood-wait signals received from the platform");
    describe_counter!(EXPIRED_FILES_CLEANED, "Stored files removed after their handle expired");
    describe_histogram!(PIPELINE_DURATION, "Wall-clock duration of one pipeline run");

    info!("Metrics exporter listening on {}", addr);
}
