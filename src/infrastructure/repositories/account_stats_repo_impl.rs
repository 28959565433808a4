// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;

use crate::domain::models::upload_account::UploadAccountStats;
use crate::domain::repositories::account_stats_repository::AccountStatsRepository;
use crate::domain::repositories::downloaded_file_repository::RepositoryError;
use crate::infrastructure::database::entities::upload_account_stats;

/// 上传身份统计仓库实现
pub struct AccountStatsRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl AccountStatsRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<upload_account_stats::Model> for UploadAccountStats {
    fn from(model: upload_account_stats::Model) -> Self {
        Self {
            identity_key: model.identity_key,
            total_uploads: model.total_uploads,
            today_uploads: model.today_uploads,
            last_upload_date: model.last_upload_date,
            last_upload_at: model.last_upload_at,
            last_error: model.last_error,
        }
    }
}

impl From<UploadAccountStats> for upload_account_stats::ActiveModel {
    fn from(stats: UploadAccountStats) -> Self {
        Self {
            identity_key: Set(stats.identity_key),
            total_uploads: Set(stats.total_uploads),
            today_uploads: Set(stats.today_uploads),
            last_upload_date: Set(stats.last_upload_date),
            last_upload_at: Set(stats.last_upload_at),
            last_error: Set(stats.last_error),
            updated_at: Set(Utc::now().fixed_offset()),
        }
    }
}

#[async_trait]
impl AccountStatsRepository for AccountStatsRepositoryImpl {
    async fn find_many(
        &self,
        identity_keys: &[String],
    ) -> Result<Vec<UploadAccountStats>, RepositoryError> {
        let rows = upload_account_stats::Entity::find()
            .filter(upload_account_stats::Column::IdentityKey.is_in(identity_keys.iter().cloned()))
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn increment_uploads(
        &self,
        identity_key: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<UploadAccountStats, RepositoryError> {
        let txn = self.db.begin().await?;

        let existing = upload_account_stats::Entity::find_by_id(identity_key.to_string())
            .one(&txn)
            .await?;
        let is_new = existing.is_none();
        let mut stats = existing
            .map(UploadAccountStats::from)
            .unwrap_or_else(|| UploadAccountStats::new(identity_key));

        stats.register_upload(today, now);

        let active: upload_account_stats::ActiveModel = stats.clone().into();
        if is_new {
            active.insert(&txn).await?;
        } else {
            active.update(&txn).await?;
        }

        txn.commit().await?;
        Ok(stats)
    }

    async fn record_error(&self, identity_key: &str, error: &str) -> Result<(), RepositoryError> {
        let existing = upload_account_stats::Entity::find_by_id(identity_key.to_string())
            .one(self.db.as_ref())
            .await?;

        match existing {
            Some(model) => {
                let mut active: upload_account_stats::ActiveModel = model.into();
                active.last_error = Set(Some(error.to_string()));
                active.updated_at = Set(Utc::now().fixed_offset());
                active.update(self.db.as_ref()).await?;
            }
            None => {
                let mut stats = UploadAccountStats::new(identity_key);
                stats.last_error = Some(error.to_string());
                let active: upload_account_stats::ActiveModel = stats.into();
                active.insert(self.db.as_ref()).await?;
            }
        }
        Ok(())
    }
}
