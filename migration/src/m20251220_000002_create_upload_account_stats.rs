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
                    .table(UploadAccountStats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UploadAccountStats::IdentityKey)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UploadAccountStats::TotalUploads)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UploadAccountStats::TodayUploads)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(UploadAccountStats::LastUploadDate).date())
                    .col(ColumnDef::new(UploadAccountStats::LastUploadAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(UploadAccountStats::LastError).text())
                    .col(
                        ColumnDef::new(UploadAccountStats::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UploadAccountStats::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UploadAccountStats {
    Table,
    IdentityKey,
    TotalUploads,
    TodayUploads,
    LastUploadDate,
    LastUploadAt,
    LastError,
    UpdatedAt,
}
