// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::application::status_tracker::TrackerError;
use crate::application::use_cases::submit_download::SubmitError;
use crate::domain::repositories::downloaded_file_repository::RepositoryError;
use crate::infrastructure::cache::state_store::StoreError;

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<validator::ValidationErrors>().is_some() {
            return StatusCode::BAD_REQUEST;
        }

        if let Some(e) = self.0.downcast_ref::<SubmitError>() {
            return match e {
                SubmitError::LimitReached(_) => StatusCode::TOO_MANY_REQUESTS,
                SubmitError::Store(_) | SubmitError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
                SubmitError::Tracker(TrackerError::Store(_) | TrackerError::Queue(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                SubmitError::Tracker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }

        if let Some(e) = self.0.downcast_ref::<TrackerError>() {
            return match e {
                TrackerError::Store(_) | TrackerError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }

        if self.0.downcast_ref::<StoreError>().is_some() {
            return StatusCode::SERVICE_UNAVAILABLE;
        }

        match self.0.downcast_ref::<RepositoryError>() {
            Some(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            Some(RepositoryError::Invalid(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = self.0.to_string();

        let body = match status {
            StatusCode::TOO_MANY_REQUESTS => {
                json!({ "status": "limit_reached", "error": error_message })
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                error!("Ephemeral store unavailable: {}", error_message);
                json!({ "error": "Service temporarily unavailable" })
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                error!("Request failed: {}", error_message);
                json!({ "error": "Internal server error" })
            }
            _ => json!({ "error": error_message }),
        };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
