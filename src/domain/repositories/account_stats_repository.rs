// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::upload_account::UploadAccountStats;
use crate::domain::repositories::downloaded_file_repository::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// 上传身份统计仓库特质
#[async_trait]
pub trait AccountStatsRepository: Send + Sync {
    /// 读取一组身份的统计，不存在的身份不会出现在结果中
    async fn find_many(
        &self,
        identity_keys: &[String],
    ) -> Result<Vec<UploadAccountStats>, RepositoryError>;

    /// 记录一次成功上传（按需创建记录并处理跨日）
    async fn increment_uploads(
        &self,
        identity_key: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<UploadAccountStats, RepositoryError>;

    /// 记录最近一次错误
    async fn record_error(&self, identity_key: &str, error: &str) -> Result<(), RepositoryError>;
}
