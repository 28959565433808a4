// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::http::StatusCode;
use serde_json::{json, Value};

use super::helpers::Harness;
use vidrelay::domain::models::downloaded_file::NewDownloadedFile;
use vidrelay::domain::repositories::downloaded_file_repository::DownloadedFileRepository;

fn body(content_key: &str, requester: &str) -> Value {
    json!({
        "source_url": format!("https://src.test/watch/{}", content_key),
        "content_key": content_key,
        "variant": "en",
        "requester_id": requester,
    })
}

fn new_file(content_key: &str, variant: &str) -> NewDownloadedFile {
    NewDownloadedFile {
        content_key: content_key.to_string(),
        variant: variant.to_string(),
        quality: "720p".to_string(),
        delivery_owner: "main".to_string(),
        session_name: "bot-a".to_string(),
        title: None,
        poster_url: None,
        source_url: None,
    }
}

/// 测试提交与状态查询
#[tokio::test]
async fn test_submit_and_poll() {
    let harness = Harness::new(&["bot-a"], &["main"], 0).await;
    let server = harness.server();

    let first = server.post("/v1/downloads").json(&body("c1", "u1")).await;
    first.assert_status(StatusCode::ACCEPTED);
    let first: Value = first.json();
    assert_eq!(first["status"], "queued");
    assert_eq!(first["queue_position"], 1);

    let second = server.post("/v1/downloads").json(&body("c2", "u2")).await;
    second.assert_status(StatusCode::ACCEPTED);
    let second: Value = second.json();
    assert_eq!(second["queue_position"], 2);

    let task_id = second["task_id"].as_str().unwrap();
    let status = server.get(&format!("/v1/downloads/{}", task_id)).await;
    status.assert_status_ok();
    let status: Value = status.json();
    assert_eq!(status["status"], "queued");
    assert_eq!(status["queue_position"], 2);
}

/// 测试重复提交返回已有任务
#[tokio::test]
async fn test_duplicate_submission_returns_existing_task() {
    let harness = Harness::new(&["bot-a"], &["main"], 0).await;
    let server = harness.server();

    let created: Value = server
        .post("/v1/downloads")
        .json(&body("c1", "u1"))
        .await
        .json();

    let duplicate = server.post("/v1/downloads").json(&body("c1", "u1")).await;
    duplicate.assert_status_ok();
    let duplicate: Value = duplicate.json();
    assert_eq!(duplicate["task_id"], created["task_id"]);
    assert_eq!(duplicate["duplicate"], true);
}

/// 测试请求者名额与存储故障
#[tokio::test]
async fn test_limit_and_store_outage() {
    let harness = Harness::new(&["bot-a"], &["main"], 0).await;
    let server = harness.server();

    server
        .post("/v1/downloads")
        .json(&body("c1", "u1"))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let limited = server.post("/v1/downloads").json(&body("c2", "u1")).await;
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let limited: Value = limited.json();
    assert_eq!(limited["status"], "limit_reached");

    harness.store.set_offline(true);
    server
        .post("/v1/downloads")
        .json(&body("c3", "u3"))
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

/// 测试非法请求体与未知任务
#[tokio::test]
async fn test_rejects_invalid_input() {
    let harness = Harness::new(&["bot-a"], &["main"], 0).await;
    let server = harness.server();

    let mut invalid = body("c1", "u1");
    invalid["source_url"] = json!("not a url");
    server
        .post("/v1/downloads")
        .json(&invalid)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .get("/v1/downloads/does-not-exist")
        .await
        .assert_status_not_found();
}

/// 测试文件查询、分片列表与清理
#[tokio::test]
async fn test_file_endpoints() {
    let harness = Harness::new(&["bot-a"], &["main"], 0).await;
    let server = harness.server();

    server
        .get("/v1/files")
        .add_query_param("content_key", "c9")
        .add_query_param("variant", "en")
        .await
        .assert_status_not_found();

    let saved = harness
        .files
        .save_with_parts(new_file("c9", "en"), &["h1".to_string(), "h2".to_string()])
        .await
        .unwrap();
    harness
        .files
        .save_with_parts(new_file("c9", "de"), &["h3".to_string()])
        .await
        .unwrap();

    let found = server
        .get("/v1/files")
        .add_query_param("content_key", "c9")
        .add_query_param("variant", "en")
        .await;
    found.assert_status_ok();
    let found: Value = found.json();
    assert_eq!(found["id"], saved.id.to_string());
    assert_eq!(found["parts"][0]["part_number"], 1);
    assert_eq!(found["parts"][1]["delivery_file_id"], "h2");

    let variants: Value = server.get("/v1/files/by-content/c9").await.json();
    let variants: Vec<&str> = variants
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["variant"].as_str().unwrap())
        .collect();
    assert_eq!(variants, vec!["de", "en"]);

    let parts: Value = server
        .get(&format!("/v1/files/{}/parts", saved.id))
        .await
        .json();
    assert_eq!(parts.as_array().unwrap().len(), 2);

    let cleaned = server
        .post("/v1/files/cleanup")
        .json(&json!({ "delivery_handle": "h2" }))
        .await;
    cleaned.assert_status_ok();
    let cleaned: Value = cleaned.json();
    assert_eq!(cleaned["deleted_parts"], 2);
    assert_eq!(cleaned["deleted_file"], true);

    server
        .get("/v1/files")
        .add_query_param("content_key", "c9")
        .add_query_param("variant", "en")
        .await
        .assert_status_not_found();
}

/// 测试监控与健康检查端点
#[tokio::test]
async fn test_monitor_endpoints() {
    let harness = Harness::new(&["bot-a"], &["main"], 0).await;
    let server = harness.server();

    server.get("/health").await.assert_text("OK");
    server
        .get("/v1/version")
        .await
        .assert_text(env!("CARGO_PKG_VERSION"));

    let summary: Value = server.get("/v1/monitor/rate-limits").await.json();
    assert_eq!(summary["total_events"], 0);
    assert_eq!(summary["rotations"], 0);
}
