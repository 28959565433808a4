// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DownloadedFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DownloadedFiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DownloadedFiles::ContentKey).string().not_null())
                    .col(ColumnDef::new(DownloadedFiles::Variant).string().not_null())
                    .col(ColumnDef::new(DownloadedFiles::Quality).string().not_null())
                    .col(ColumnDef::new(DownloadedFiles::DeliveryOwner).string().not_null())
                    .col(ColumnDef::new(DownloadedFiles::SessionName).string().not_null())
                    .col(ColumnDef::new(DownloadedFiles::Title).string())
                    .col(ColumnDef::new(DownloadedFiles::PosterUrl).string())
                    .col(ColumnDef::new(DownloadedFiles::SourceUrl).string())
                    .col(
                        ColumnDef::new(DownloadedFiles::Reviewed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DownloadedFiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_downloaded_files_content_variant")
                    .table(DownloadedFiles::Table)
                    .col(DownloadedFiles::ContentKey)
                    .col(DownloadedFiles::Variant)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DownloadedFileParts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DownloadedFileParts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DownloadedFileParts::FileId).uuid().not_null())
                    .col(
                        ColumnDef::new(DownloadedFileParts::PartNumber)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DownloadedFileParts::DeliveryFileId)
                            .string()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_downloaded_file_parts_file")
                            .from(DownloadedFileParts::Table, DownloadedFileParts::FileId)
                            .to(DownloadedFiles::Table, DownloadedFiles::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_downloaded_file_parts_file_part")
                    .table(DownloadedFileParts::Table)
                    .col(DownloadedFileParts::FileId)
                    .col(DownloadedFileParts::PartNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_downloaded_file_parts_delivery_file_id")
                    .table(DownloadedFileParts::Table)
                    .col(DownloadedFileParts::DeliveryFileId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DownloadedFileParts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DownloadedFiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DownloadedFiles {
    Table,
    Id,
    ContentKey,
    Variant,
    Quality,
    DeliveryOwner,
    SessionName,
    Title,
    PosterUrl,
    SourceUrl,
    Reviewed,
    CreatedAt,
}

#[derive(DeriveIden)]
enum DownloadedFileParts {
    Table,
    Id,
    FileId,
    PartNumber,
    DeliveryFileId,
}
