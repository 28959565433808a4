// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "upload_account_stats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub identity_key: String,
    pub total_uploads: i64,
    pub today_uploads: i64,
    pub last_upload_date: Option<Date>,
    pub last_upload_at: Option<DateTimeWithTimeZone>,
    pub last_error: Option<String>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
