// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::status_tracker::StatusTracker;
use crate::application::use_cases::submit_download::SubmitDownloadUseCase;
use crate::domain::repositories::downloaded_file_repository::DownloadedFileRepository;
use crate::monitor::RateLimitMonitor;
use crate::presentation::handlers::{download_handler, file_handler, monitor_handler};

/// 路由依赖的共享组件
#[derive(Clone)]
pub struct ApiContext {
    pub submit: Arc<SubmitDownloadUseCase>,
    pub tracker: Arc<StatusTracker>,
    pub files: Arc<dyn DownloadedFileRepository>,
    pub monitor: Arc<RateLimitMonitor>,
}

/// 创建应用路由
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes() -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version));

    let api_routes = Router::new()
        .route("/v1/downloads", post(download_handler::submit_download))
        .route(
            "/v1/downloads/{task_id}",
            get(download_handler::get_download_status),
        )
        .route("/v1/files", get(file_handler::lookup_file))
        .route(
            "/v1/files/by-content/{content_key}",
            get(file_handler::list_by_content),
        )
        .route("/v1/files/{file_id}/parts", get(file_handler::get_parts))
        .route("/v1/files/cleanup", post(file_handler::cleanup_file))
        .route(
            "/v1/monitor/rate-limits",
            get(monitor_handler::rate_limits),
        );

    Router::new().merge(public_routes).merge(api_routes)
}

/// 挂载共享组件与请求追踪后的完整应用
pub fn app(context: ApiContext) -> Router {
    routes()
        .layer(Extension(context.submit))
        .layer(Extension(context.tracker))
        .layer(Extension(context.files))
        .layer(Extension(context.monitor))
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
///
/// # 返回值
///
/// 返回应用版本号
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
