// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::downloaded_file::{
    CleanupOutcome, DownloadedFile, DownloadedFilePart, NewDownloadedFile, StoredHandle,
};
use crate::domain::repositories::downloaded_file_repository::{
    DownloadedFileRepository, RepositoryError,
};
use crate::infrastructure::database::entities::{downloaded_file, downloaded_file_part};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// 已投递文件仓库实现
///
/// 基于SeaORM实现的文件与分片数据访问层
#[derive(Clone)]
pub struct DownloadedFileRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl DownloadedFileRepositoryImpl {
    /// 创建新的仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<downloaded_file::Model> for DownloadedFile {
    fn from(model: downloaded_file::Model) -> Self {
        Self {
            id: model.id,
            content_key: model.content_key,
            variant: model.variant,
            quality: model.quality,
            delivery_owner: model.delivery_owner,
            session_name: model.session_name,
            title: model.title,
            poster_url: model.poster_url,
            source_url: model.source_url,
            reviewed: model.reviewed,
            created_at: model.created_at,
        }
    }
}

impl From<downloaded_file_part::Model> for DownloadedFilePart {
    fn from(model: downloaded_file_part::Model) -> Self {
        Self {
            id: model.id,
            file_id: model.file_id,
            part_number: model.part_number,
            delivery_file_id: model.delivery_file_id,
        }
    }
}

#[async_trait]
impl DownloadedFileRepository for DownloadedFileRepositoryImpl {
    async fn find_by_content(
        &self,
        content_key: &str,
        variant: &str,
    ) -> Result<Option<DownloadedFile>, RepositoryError> {
        let file = downloaded_file::Entity::find()
            .filter(downloaded_file::Column::ContentKey.eq(content_key))
            .filter(downloaded_file::Column::Variant.eq(variant))
            .one(self.db.as_ref())
            .await?;
        Ok(file.map(Into::into))
    }

    async fn list_by_content_key(
        &self,
        content_key: &str,
    ) -> Result<Vec<DownloadedFile>, RepositoryError> {
        let files = downloaded_file::Entity::find()
            .filter(downloaded_file::Column::ContentKey.eq(content_key))
            .order_by_asc(downloaded_file::Column::Variant)
            .all(self.db.as_ref())
            .await?;
        Ok(files.into_iter().map(Into::into).collect())
    }

    async fn get_parts(&self, file_id: Uuid) -> Result<Vec<DownloadedFilePart>, RepositoryError> {
        let parts = downloaded_file_part::Entity::find()
            .filter(downloaded_file_part::Column::FileId.eq(file_id))
            .order_by_asc(downloaded_file_part::Column::PartNumber)
            .all(self.db.as_ref())
            .await?;
        Ok(parts.into_iter().map(Into::into).collect())
    }

    async fn save_with_parts(
        &self,
        file: NewDownloadedFile,
        handles: &[String],
    ) -> Result<DownloadedFile, RepositoryError> {
        if handles.is_empty() {
            return Err(RepositoryError::Invalid(
                "a downloaded file needs at least one part".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        // Replace any previous upload of the same content/variant
        if let Some(existing) = downloaded_file::Entity::find()
            .filter(downloaded_file::Column::ContentKey.eq(file.content_key.as_str()))
            .filter(downloaded_file::Column::Variant.eq(file.variant.as_str()))
            .one(&txn)
            .await?
        {
            downloaded_file_part::Entity::delete_many()
                .filter(downloaded_file_part::Column::FileId.eq(existing.id))
                .exec(&txn)
                .await?;
            downloaded_file::Entity::delete_by_id(existing.id)
                .exec(&txn)
                .await?;
            debug!(
                "Replaced previous file {} for {}/{}",
                existing.id, file.content_key, file.variant
            );
        }

        let file_id = Uuid::new_v4();
        let created = downloaded_file::ActiveModel {
            id: Set(file_id),
            content_key: Set(file.content_key),
            variant: Set(file.variant),
            quality: Set(file.quality),
            delivery_owner: Set(file.delivery_owner),
            session_name: Set(file.session_name),
            title: Set(file.title),
            poster_url: Set(file.poster_url),
            source_url: Set(file.source_url),
            reviewed: Set(false),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&txn)
        .await?;

        for (index, handle) in handles.iter().enumerate() {
            downloaded_file_part::ActiveModel {
                id: Set(Uuid::new_v4()),
                file_id: Set(file_id),
                part_number: Set(index as i32 + 1),
                delivery_file_id: Set(handle.clone()),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(created.into())
    }

    async fn cleanup_expired_file(
        &self,
        delivery_handle: &str,
    ) -> Result<CleanupOutcome, RepositoryError> {
        let txn = self.db.begin().await?;

        let matching = downloaded_file_part::Entity::find()
            .filter(downloaded_file_part::Column::DeliveryFileId.eq(delivery_handle))
            .all(&txn)
            .await?;

        let file_ids: BTreeSet<Uuid> = matching.iter().map(|part| part.file_id).collect();
        let mut outcome = CleanupOutcome::default();

        for file_id in file_ids {
            let parts = downloaded_file_part::Entity::delete_many()
                .filter(downloaded_file_part::Column::FileId.eq(file_id))
                .exec(&txn)
                .await?;
            outcome.deleted_parts += parts.rows_affected;

            let file = downloaded_file::Entity::delete_by_id(file_id)
                .exec(&txn)
                .await?;
            outcome.deleted_file |= file.rows_affected > 0;
        }

        txn.commit().await?;

        if outcome.deleted_file {
            info!(
                "Cleaned up expired handle {}: {} parts removed",
                delivery_handle, outcome.deleted_parts
            );
        }
        Ok(outcome)
    }

    async fn list_handles(&self) -> Result<Vec<StoredHandle>, RepositoryError> {
        let rows = downloaded_file_part::Entity::find()
            .find_also_related(downloaded_file::Entity)
            .order_by_asc(downloaded_file_part::Column::FileId)
            .order_by_asc(downloaded_file_part::Column::PartNumber)
            .all(self.db.as_ref())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(part, file)| {
                file.map(|file| StoredHandle {
                    file_id: part.file_id,
                    part_number: part.part_number,
                    delivery_file_id: part.delivery_file_id,
                    delivery_owner: file.delivery_owner,
                })
            })
            .collect())
    }
}
