// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::path::PathBuf;
use tokio::sync::mpsc;

use super::helpers::{busy_today, Harness};
use vidrelay::delivery::{DeliveryFailure, PartProgress};

async fn write_source(harness: &Harness, size: usize) -> PathBuf {
    let path = harness.work_dir.path().join("video.mp4");
    tokio::fs::write(&path, vec![3u8; size]).await.unwrap();
    path
}

/// 测试外层凭据的回退
///
/// 一个凭据的目标不可达时，整个文件改用另一个凭据重新上传。
#[tokio::test]
async fn test_falls_back_to_working_credential() {
    let harness = Harness::new(&["bot-a"], &["broken", "healthy"], 0).await;
    harness
        .client
        .broken_destinations
        .lock()
        .insert("dest-broken".to_string());
    let source = write_source(&harness, 3000).await;

    let outcome = harness
        .delivery()
        .deliver("task-1", &source, None)
        .await
        .unwrap();

    assert_eq!(outcome.credential, "healthy");
    assert_eq!(outcome.planned_parts, 3);
    assert_eq!(outcome.handles.len(), 3);
    assert!(harness
        .client
        .uploads()
        .iter()
        .all(|u| u.destination == "dest-healthy"));
}

/// 测试分片进度按分片上报
#[tokio::test]
async fn test_reports_progress_per_part() {
    let harness = Harness::new(&["bot-a"], &["main"], 0).await;
    let source = write_source(&harness, 3000).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    harness
        .delivery()
        .deliver("task-2", &source, Some(&tx))
        .await
        .unwrap();
    drop(tx);

    let mut updates: Vec<PartProgress> = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    for part in 1..=3 {
        let last = updates
            .iter()
            .filter(|u| u.part_number == part)
            .last()
            .unwrap();
        assert_eq!(last.percent, 100.0);
    }
    assert!(updates.iter().any(|u| u.percent == 50.0));
}

/// 测试认证失败的身份在整个任务内保持排除
#[tokio::test]
async fn test_auth_rejected_everywhere_fails_delivery() {
    let harness = Harness::new(&["bot-a", "bot-b"], &["main", "backup"], 0).await;
    {
        let mut rejected = harness.client.auth_failures.lock();
        rejected.insert("bot-a".to_string());
        rejected.insert("bot-b".to_string());
    }
    let source = write_source(&harness, 500).await;

    let err = harness
        .delivery()
        .deliver("task-3", &source, None)
        .await
        .unwrap_err();

    match err {
        DeliveryFailure::AllCredentialsFailed { attempted, .. } => assert_eq!(attempted, 2),
        other => panic!("unexpected failure {:?}", other),
    }
    // Each identity is tried exactly once across both credentials
    assert_eq!(
        harness
            .client
            .attempts
            .load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

/// 测试负载均衡优先选择今日上传最少的身份
#[tokio::test]
async fn test_prefers_least_used_identity() {
    let harness = Harness::new(&["bot-a", "bot-b", "bot-c"], &["main"], 0).await;
    harness.stats.seed(busy_today("bot-a", 3));
    harness.stats.seed(busy_today("bot-b", 1));
    harness.stats.seed(busy_today("bot-c", 2));
    let source = write_source(&harness, 500).await;

    let outcome = harness
        .delivery()
        .deliver("task-4", &source, None)
        .await
        .unwrap();
    assert_eq!(outcome.session_name, "bot-b");
}

/// 测试没有配置凭据时立即失败
#[tokio::test]
async fn test_without_credentials() {
    let harness = Harness::new(&["bot-a"], &[], 0).await;
    let source = write_source(&harness, 500).await;

    let err = harness
        .delivery()
        .deliver("task-5", &source, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryFailure::NoCredentials));
}
