// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{extract::Extension, Json};
use std::sync::Arc;

use crate::domain::models::rate_limit::RateLimitSummary;
use crate::monitor::RateLimitMonitor;

/// 限流统计
pub async fn rate_limits(
    Extension(monitor): Extension<Arc<RateLimitMonitor>>,
) -> Json<RateLimitSummary> {
    Json(monitor.summary())
}
