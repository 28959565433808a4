// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 上传身份的统计信息
///
/// 只用于负载均衡决策，不对终端用户展示。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAccountStats {
    pub identity_key: String,
    pub total_uploads: i64,
    pub today_uploads: i64,
    pub last_upload_date: Option<NaiveDate>,
    pub last_upload_at: Option<DateTime<FixedOffset>>,
    pub last_error: Option<String>,
}

impl UploadAccountStats {
    pub fn new(identity_key: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key.into(),
            total_uploads: 0,
            today_uploads: 0,
            last_upload_date: None,
            last_upload_at: None,
            last_error: None,
        }
    }

    /// 指定配额日的有效上传数
    ///
    /// 上次上传不在 `today` 时视为 0，尚未写回存储也成立。
    pub fn uploads_on(&self, today: NaiveDate) -> i64 {
        match self.last_upload_date {
            Some(date) if date == today => self.today_uploads,
            _ => 0,
        }
    }

    /// 记录一次成功上传，先做跨日检查再累加
    pub fn register_upload(&mut self, today: NaiveDate, now: DateTime<Utc>) {
        if self.last_upload_date != Some(today) {
            self.today_uploads = 0;
            self.last_upload_date = Some(today);
        }
        self.total_uploads += 1;
        self.today_uploads += 1;
        self.last_upload_at = Some(now.into());
    }
}

/// 计算 `now` 所属的配额日
///
/// 配额在每天 `reset_at`（UTC）切换，早于该时刻仍算前一天。
pub fn quota_day(now: DateTime<Utc>, reset_at: NaiveTime) -> NaiveDate {
    let date = now.date_naive();
    if now.time() < reset_at {
        date - Duration::days(1)
    } else {
        date
    }
}
