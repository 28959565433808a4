// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::application::dto::download_request::SubmitDownloadRequest;
use crate::application::status_tracker::StatusTracker;
use crate::application::use_cases::submit_download::SubmitDownloadUseCase;
use crate::presentation::errors::AppError;

/// 提交下载任务
///
/// 新任务返回 202，命中已有任务返回 200
pub async fn submit_download(
    Extension(use_case): Extension<Arc<SubmitDownloadUseCase>>,
    Json(payload): Json<SubmitDownloadRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let response = use_case.execute(payload).await?;
    let status = if response.duplicate {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(response)))
}

/// 查询任务状态
pub async fn get_download_status(
    Extension(tracker): Extension<Arc<StatusTracker>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match tracker.view(&task_id).await? {
        Some(view) => Ok((StatusCode::OK, Json(json!(view)))),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Task not found" })),
        )),
    }
}
