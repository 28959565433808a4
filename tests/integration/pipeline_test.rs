// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;

use super::helpers::{busy_today, request, Harness};
use vidrelay::application::status_tracker::{merge_progress_key, upload_progress_key};
use vidrelay::domain::models::task::TaskStage;
use vidrelay::domain::repositories::downloaded_file_repository::DownloadedFileRepository;
use vidrelay::domain::services::extraction_service::{
    ExtractionError, ExtractionResult, Extractor,
};
use vidrelay::infrastructure::cache::state_store::StateStore;
use vidrelay::queue::TaskQueue;
use vidrelay::workers::PipelineOutcome;

struct PanickingExtractor;

#[async_trait]
impl Extractor for PanickingExtractor {
    async fn extract(
        &self,
        _source_url: &str,
        _variant: &str,
    ) -> Result<Option<ExtractionResult>, ExtractionError> {
        panic!("extractor exploded");
    }
}

/// 测试小文件整体上传
///
/// 500 字节、上限 1400 字节时只产生一个分片，且不调用切片。
#[tokio::test]
async fn test_small_file_is_uploaded_as_single_part() {
    let harness = Harness::new(&["bot-a"], &["main"], 500).await;
    let task = harness.submit_and_take("c-small", "u1").await;

    let outcome = harness.executor(1).execute(task.clone()).await;
    let result = match outcome {
        PipelineOutcome::Completed(result) => result,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(result.parts, 1);
    assert_eq!(result.quality, "1080p");
    assert!(harness.media.cuts.lock().is_empty());

    let parts = harness.files.get_parts(result.file_id).await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].part_number, 1);
    assert_eq!(harness.client.uploads()[0].file_name, "video.mp4");
}

/// 测试超限文件按时间切片并按序上传
///
/// 3000 字节、上限 1400 字节 → 3 片，分片记录编号为 1,2,3。
#[tokio::test]
async fn test_large_file_is_split_into_ordered_parts() {
    let harness = Harness::new(&["bot-a"], &["main"], 3000).await;
    let task = harness.submit_and_take("c-large", "u1").await;

    let outcome = harness.executor(1).execute(task.clone()).await;
    let result = match outcome {
        PipelineOutcome::Completed(result) => result,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(result.parts, 3);

    let cuts = harness.media.cuts.lock().clone();
    assert_eq!(
        cuts,
        vec![(0.0, Some(1200.0)), (1200.0, Some(1200.0)), (2400.0, None)]
    );

    let uploads = harness.client.uploads();
    let names: Vec<&str> = uploads.iter().map(|u| u.file_name.as_str()).collect();
    assert_eq!(names, vec!["video.part1.mp4", "video.part2.mp4", "video.part3.mp4"]);

    let parts = harness.files.get_parts(result.file_id).await.unwrap();
    let numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    let handles: Vec<String> = parts.iter().map(|p| p.delivery_file_id.clone()).collect();
    let uploaded: Vec<String> = uploads.iter().map(|u| u.handle.clone()).collect();
    assert_eq!(handles, uploaded);

    let file = harness
        .files
        .find_by_content("c-large", "en")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.delivery_owner, "main");
    assert_eq!(file.session_name, "bot-a");
    assert_eq!(file.title.as_deref(), Some("Sample"));
}

/// 测试完成后的状态与清理
#[tokio::test]
async fn test_completion_releases_bookkeeping() {
    let harness = Harness::new(&["bot-a"], &["main"], 3000).await;
    let task = harness.submit_and_take("c-done", "u1").await;

    harness.executor(1).execute(task.clone()).await;

    let view = harness.tracker.view(&task.task_id).await.unwrap().unwrap();
    assert_eq!(view.status, TaskStage::Done);
    assert_eq!(view.result.unwrap().parts, 3);
    assert!(view.error.is_none());

    assert!(harness
        .store
        .get(&merge_progress_key(&task.task_id))
        .await
        .unwrap()
        .is_none());
    assert!(harness
        .store
        .hgetall(&upload_progress_key(&task.task_id))
        .await
        .unwrap()
        .is_empty());
    assert!(!harness.work_dir.path().join(&task.task_id).exists());

    // Claim and requester slot are free again
    let again = harness
        .submit
        .execute(request("c-done", "en", "u1"))
        .await
        .unwrap();
    assert!(!again.duplicate);
    assert_ne!(again.task_id, task.task_id);
}

/// 测试空提取结果的重试预算
///
/// MaxRetries=1 时连续两次空结果，第二次执行后任务以错误结束。
#[tokio::test]
async fn test_empty_extraction_fails_after_two_attempts() {
    let harness = Harness::new(&["bot-a"], &["main"], 500).await;
    harness.extractor.always_empty(2);
    let task = harness.submit_and_take("c-empty", "u1").await;
    let executor = harness.executor(1);

    let first = executor.execute(task.clone()).await;
    assert_eq!(first, PipelineOutcome::Requeued { attempt: 1 });
    assert_eq!(harness.tracker.retries(&task.task_id).await.unwrap(), 1);
    assert_eq!(
        harness.tracker.stage(&task.task_id).await.unwrap(),
        Some(TaskStage::Queued)
    );

    // Re-enqueued unchanged at the tail
    let requeued = harness.queue.dequeue().await.unwrap().unwrap();
    assert_eq!(requeued, task);

    let second = executor.execute(requeued).await;
    assert_eq!(
        second,
        PipelineOutcome::Failed("No downloadable stream found".to_string())
    );
    assert_eq!(harness.extractor.calls(), 2);
    assert_eq!(harness.queue.len().await.unwrap(), 0);

    let view = harness.tracker.view(&task.task_id).await.unwrap().unwrap();
    assert_eq!(view.status, TaskStage::Error);
    assert_eq!(view.error.as_deref(), Some("No downloadable stream found"));
    assert_eq!(harness.tracker.retries(&task.task_id).await.unwrap(), 0);
    assert!(harness.client.uploads().is_empty());

    // Only the terminal failure reaches the operator
    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains(&task.task_id));
    assert!(messages[0].contains("no result"));
}

/// 测试重试预算耗尽的临时故障同样通知运维
#[tokio::test]
async fn test_exhausted_transient_failure_notifies_operator() {
    let harness = Harness::new(&["bot-a"], &["main"], 500).await;
    harness
        .extractor
        .push(Err(ExtractionError::Transient("upstream 503".to_string())));
    let task = harness.submit_and_take("c-flaky", "u1").await;

    let outcome = harness.executor(0).execute(task.clone()).await;
    assert_eq!(
        outcome,
        PipelineOutcome::Failed("Source temporarily unavailable".to_string())
    );
    let messages = harness.notifier.messages();
    assert!(messages.iter().any(|m| m.contains("upstream 503")));
}

/// 测试执行中 panic 的任务以错误结束并释放占用
#[tokio::test]
async fn test_panicking_stage_ends_in_error() {
    let harness = Harness::new(&["bot-a"], &["main"], 500).await;
    let task = harness.submit_and_take("c-panic", "u1").await;

    let outcome = harness
        .executor_with(Arc::new(PanickingExtractor), 1)
        .execute(task.clone())
        .await;
    assert_eq!(outcome, PipelineOutcome::Failed("Internal error".to_string()));

    let view = harness.tracker.view(&task.task_id).await.unwrap().unwrap();
    assert_eq!(view.status, TaskStage::Error);
    assert_eq!(view.error.as_deref(), Some("Internal error"));
    assert!(harness
        .notifier
        .messages()
        .iter()
        .any(|m| m.contains("extractor exploded")));

    // Claim and requester slot are free again
    let again = harness
        .submit
        .execute(request("c-panic", "en", "u1"))
        .await
        .unwrap();
    assert!(!again.duplicate);
}

/// 测试不可重试的提取失败直接结束并通知运维
#[tokio::test]
async fn test_fatal_extraction_is_not_retried() {
    let harness = Harness::new(&["bot-a"], &["main"], 500).await;
    harness
        .extractor
        .push(Err(ExtractionError::Fatal("removed by owner".to_string())));
    let task = harness.submit_and_take("c-gone", "u1").await;

    let outcome = harness.executor(3).execute(task.clone()).await;
    assert_eq!(
        outcome,
        PipelineOutcome::Failed("Source could not be resolved".to_string())
    );
    assert_eq!(harness.queue.len().await.unwrap(), 0);

    let messages = harness.notifier.messages();
    assert!(messages.iter().any(|m| m.contains(&task.task_id) && m.contains("removed by owner")));
}

/// 测试合并输出为空时不进入上传
#[tokio::test]
async fn test_empty_merge_output_is_fatal() {
    let harness = Harness::new(&["bot-a"], &["main"], 0).await;
    let task = harness.submit_and_take("c-corrupt", "u1").await;

    let outcome = harness.executor(1).execute(task.clone()).await;
    assert_eq!(
        outcome,
        PipelineOutcome::Failed("Failed to assemble the video".to_string())
    );
    assert!(harness.client.uploads().is_empty());
    assert_eq!(harness.notifier.messages().len(), 1);
    assert!(!harness.work_dir.path().join(&task.task_id).exists());
}

/// 测试认证失败的身份不再被重试
///
/// 身份 A 认证失败后，同一分片立即改由 B 上传。
#[tokio::test]
async fn test_auth_failure_moves_to_next_identity() {
    let harness = Harness::new(&["bot-a", "bot-b"], &["main"], 500).await;
    harness.stats.seed(busy_today("bot-b", 5));
    harness.client.auth_failures.lock().insert("bot-a".to_string());
    let task = harness.submit_and_take("c-auth", "u1").await;

    let outcome = harness.executor(1).execute(task.clone()).await;
    assert!(matches!(outcome, PipelineOutcome::Completed(_)));

    let uploads = harness.client.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].identity, "bot-b");
    // One rejected attempt on A, no retries
    assert_eq!(
        harness.client.attempts.load(std::sync::atomic::Ordering::SeqCst),
        2
    );

    let stats_a = harness.stats.get("bot-a").unwrap();
    assert!(stats_a.last_error.unwrap().contains("session revoked"));
    assert_eq!(harness.stats.get("bot-b").unwrap().total_uploads, 6);

    let file = harness
        .files
        .find_by_content("c-auth", "en")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.session_name, "bot-b");
}

/// 测试所有凭据都失败时不留下任何持久化记录
#[tokio::test]
async fn test_no_partial_persistence_when_delivery_fails() {
    let harness = Harness::new(&["bot-a"], &["main", "backup"], 3000).await;
    {
        let mut broken = harness.client.broken_destinations.lock();
        broken.insert("dest-main".to_string());
        broken.insert("dest-backup".to_string());
    }
    let task = harness.submit_and_take("c-down", "u1").await;

    let outcome = harness.executor(1).execute(task.clone()).await;
    assert_eq!(
        outcome,
        PipelineOutcome::Failed("Failed to deliver the video".to_string())
    );
    assert!(harness
        .files
        .find_by_content("c-down", "en")
        .await
        .unwrap()
        .is_none());

    let messages = harness.notifier.messages();
    assert!(messages.iter().any(|m| m.contains("main")));
    assert!(messages.iter().any(|m| m.contains("backup")));
}

/// 测试持久化替换同一内容/变体的旧记录
#[tokio::test]
async fn test_redelivery_replaces_previous_record() {
    let harness = Harness::new(&["bot-a"], &["main"], 500).await;
    let executor = harness.executor(1);

    let first = harness.submit_and_take("c-again", "u1").await;
    let first_id = match executor.execute(first).await {
        PipelineOutcome::Completed(result) => result.file_id,
        other => panic!("unexpected outcome {:?}", other),
    };

    *harness.media.merged_size.lock() = 3000;
    let second = harness.submit_and_take("c-again", "u1").await;
    let second_id = match executor.execute(second).await {
        PipelineOutcome::Completed(result) => result.file_id,
        other => panic!("unexpected outcome {:?}", other),
    };

    assert_ne!(first_id, second_id);
    assert!(harness.files.get_parts(first_id).await.unwrap().is_empty());
    assert_eq!(harness.files.get_parts(second_id).await.unwrap().len(), 3);
    assert_eq!(harness.files.list_by_content_key("c-again").await.unwrap().len(), 1);
}
