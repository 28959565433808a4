// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 已投递文件
///
/// 上传成功后创建，之后只会被校验器在投递句柄失效时删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub id: Uuid,
    pub content_key: String,
    pub variant: String,
    pub quality: String,
    /// 外层投递凭据名称，句柄校验使用该凭据
    pub delivery_owner: String,
    /// 实际执行上传的身份
    pub session_name: String,
    pub title: Option<String>,
    pub poster_url: Option<String>,
    pub source_url: Option<String>,
    pub reviewed: bool,
    pub created_at: DateTime<FixedOffset>,
}

/// 文件分片，`part_number` 从 1 开始
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFilePart {
    pub id: Uuid,
    pub file_id: Uuid,
    pub part_number: i32,
    pub delivery_file_id: String,
}

/// 新建文件记录所需的字段
#[derive(Debug, Clone, PartialEq)]
pub struct NewDownloadedFile {
    pub content_key: String,
    pub variant: String,
    pub quality: String,
    pub delivery_owner: String,
    pub session_name: String,
    pub title: Option<String>,
    pub poster_url: Option<String>,
    pub source_url: Option<String>,
}

/// 文件及其有序分片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileWithParts {
    #[serde(flatten)]
    pub file: DownloadedFile,
    pub parts: Vec<DownloadedFilePart>,
}

/// 清理失效文件的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOutcome {
    pub deleted_parts: u64,
    pub deleted_file: bool,
}

/// 待校验的投递句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHandle {
    pub file_id: Uuid,
    pub part_number: i32,
    pub delivery_file_id: String,
    pub delivery_owner: String,
}
