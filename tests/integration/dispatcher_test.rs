// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use super::helpers::{request, Harness};
use vidrelay::domain::models::task::TaskStage;
use vidrelay::infrastructure::cache::state_store::StateStore;
use vidrelay::workers::{Dispatcher, DispatcherConfig, ACTIVE_DOWNLOADS_KEY};

/// 测试调度循环驱动多个任务直到完成
///
/// 三个不同请求者的任务在并发上限 2 下全部完成，计数归零。
#[tokio::test]
async fn test_dispatcher_drives_tasks_to_completion() {
    let harness = Harness::new(&["bot-a", "bot-b"], &["main"], 3000).await;

    let mut task_ids = Vec::new();
    for (i, requester) in ["u1", "u2", "u3"].iter().enumerate() {
        let response = harness
            .submit
            .execute(request(&format!("c{}", i), "en", requester))
            .await
            .unwrap();
        assert_eq!(response.queue_position, Some(i + 1));
        task_ids.push(response.task_id);
    }

    let dispatcher = Dispatcher::new(
        harness.store.clone(),
        harness.queue.clone(),
        Arc::new(harness.executor(1)),
        DispatcherConfig {
            max_concurrent: 2,
            busy_poll: Duration::from_millis(10),
            idle_poll: Duration::from_millis(10),
            report_interval: Duration::from_secs(300),
        },
    );
    let handle = dispatcher.start();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let mut done = 0;
        for id in &task_ids {
            if harness.tracker.stage(id).await.unwrap() == Some(TaskStage::Done) {
                done += 1;
            }
        }
        if done == task_ids.len() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "tasks did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Slots are released after the terminal status write
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.abort();

    assert_eq!(
        harness
            .store
            .get(ACTIVE_DOWNLOADS_KEY)
            .await
            .unwrap()
            .as_deref(),
        Some("0")
    );
    assert_eq!(harness.client.uploads().len(), 9);
}
