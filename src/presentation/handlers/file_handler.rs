// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Json, Path, Query},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::application::dto::file_request::{CleanupRequest, FileLookupQuery};
use crate::domain::models::downloaded_file::FileWithParts;
use crate::domain::repositories::downloaded_file_repository::{
    DownloadedFileRepository, RepositoryError,
};
use crate::presentation::errors::AppError;

type FileRepo = Arc<dyn DownloadedFileRepository>;

/// 按 (内容, 变体) 查找文件及其有序分片
pub async fn lookup_file(
    Extension(files): Extension<FileRepo>,
    Query(query): Query<FileLookupQuery>,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;

    let file = files
        .find_by_content(&query.content_key, &query.variant)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    let parts = files.get_parts(file.id).await?;
    Ok(Json(FileWithParts { file, parts }))
}

/// 列出同一内容的所有变体
pub async fn list_by_content(
    Extension(files): Extension<FileRepo>,
    Path(content_key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(files.list_by_content_key(&content_key).await?))
}

pub async fn get_parts(
    Extension(files): Extension<FileRepo>,
    Path(file_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(files.get_parts(file_id).await?))
}

/// 清理句柄已失效的文件
pub async fn cleanup_file(
    Extension(files): Extension<FileRepo>,
    Json(payload): Json<CleanupRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    Ok(Json(files.cleanup_expired_file(&payload.delivery_handle).await?))
}
