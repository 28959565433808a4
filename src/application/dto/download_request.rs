// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::models::task::{TaskStage, TaskStatusView};

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SubmitDownloadRequest {
    #[validate(url)]
    pub source_url: String,
    #[validate(length(min = 1, max = 128))]
    pub content_key: String,
    #[validate(length(min = 1, max = 32))]
    pub variant: String,
    #[validate(length(min = 1, max = 128))]
    pub requester_id: String,
}

/// 提交结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDownloadResponse {
    pub task_id: String,
    pub status: TaskStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    /// 是否命中了已有任务
    #[serde(default)]
    pub duplicate: bool,
}

impl SubmitDownloadResponse {
    pub fn accepted(task_id: String, position: usize) -> Self {
        Self {
            task_id,
            status: TaskStage::Queued,
            queue_position: Some(position),
            duplicate: false,
        }
    }

    pub fn existing(task_id: String, view: Option<TaskStatusView>) -> Self {
        let (status, queue_position) = match view {
            Some(view) => (view.status, view.queue_position),
            None => (TaskStage::Queued, None),
        };
        Self {
            task_id,
            status,
            queue_position,
            duplicate: true,
        }
    }
}
