// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{NaiveDate, TimeZone, Utc};

use super::super::helpers::create_test_db;
use vidrelay::domain::repositories::account_stats_repository::AccountStatsRepository;
use vidrelay::infrastructure::repositories::account_stats_repo_impl::AccountStatsRepositoryImpl;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

/// 测试首次上传创建记录，跨日后当日计数归零
#[tokio::test]
async fn test_increment_creates_and_rolls_over() {
    let repo = AccountStatsRepositoryImpl::new(create_test_db().await);
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

    let first = repo.increment_uploads("bot-a", day(1), now).await.unwrap();
    assert_eq!((first.total_uploads, first.today_uploads), (1, 1));

    let second = repo.increment_uploads("bot-a", day(1), now).await.unwrap();
    assert_eq!((second.total_uploads, second.today_uploads), (2, 2));

    let next_day = repo.increment_uploads("bot-a", day(2), now).await.unwrap();
    assert_eq!((next_day.total_uploads, next_day.today_uploads), (3, 1));
    assert_eq!(next_day.last_upload_date, Some(day(2)));

    let stored = repo.find_many(&["bot-a".to_string()]).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].uploads_on(day(2)), 1);
    assert_eq!(stored[0].uploads_on(day(3)), 0);
}

/// 测试错误记录不影响计数
#[tokio::test]
async fn test_record_error_keeps_counters() {
    let repo = AccountStatsRepositoryImpl::new(create_test_db().await);
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

    repo.record_error("bot-new", "auth key unregistered")
        .await
        .unwrap();
    repo.increment_uploads("bot-b", day(1), now).await.unwrap();
    repo.record_error("bot-b", "flood").await.unwrap();

    let mut stats = repo
        .find_many(&["bot-new".to_string(), "bot-b".to_string(), "missing".to_string()])
        .await
        .unwrap();
    stats.sort_by(|a, b| a.identity_key.cmp(&b.identity_key));

    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].identity_key, "bot-b");
    assert_eq!(stats[0].total_uploads, 1);
    assert_eq!(stats[0].last_error.as_deref(), Some("flood"));
    assert_eq!(stats[1].total_uploads, 0);
    assert_eq!(stats[1].last_error.as_deref(), Some("auth key unregistered"));
}
