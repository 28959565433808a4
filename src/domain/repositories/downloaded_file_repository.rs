// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::downloaded_file::{
    CleanupOutcome, DownloadedFile, DownloadedFilePart, NewDownloadedFile, StoredHandle,
};
use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 数据不满足约束
    #[error("Invalid data: {0}")]
    Invalid(String),
}

/// 已投递文件仓库特质
///
/// 定义文件与分片的数据访问接口
#[async_trait]
pub trait DownloadedFileRepository: Send + Sync {
    /// 按内容与变体查找文件
    async fn find_by_content(
        &self,
        content_key: &str,
        variant: &str,
    ) -> Result<Option<DownloadedFile>, RepositoryError>;

    /// 列出同一内容的全部变体
    async fn list_by_content_key(
        &self,
        content_key: &str,
    ) -> Result<Vec<DownloadedFile>, RepositoryError>;

    /// 按分片序号升序返回分片
    async fn get_parts(&self, file_id: Uuid) -> Result<Vec<DownloadedFilePart>, RepositoryError>;

    /// 在同一事务中写入文件和全部分片
    ///
    /// `handles[i]` 成为第 `i + 1` 个分片；同一 (内容, 变体) 的旧记录会被替换。
    async fn save_with_parts(
        &self,
        file: NewDownloadedFile,
        handles: &[String],
    ) -> Result<DownloadedFile, RepositoryError>;

    /// 按失效的投递句柄删除文件和全部分片
    async fn cleanup_expired_file(
        &self,
        delivery_handle: &str,
    ) -> Result<CleanupOutcome, RepositoryError>;

    /// 列出全部已存储的投递句柄
    async fn list_handles(&self) -> Result<Vec<StoredHandle>, RepositoryError>;
}
