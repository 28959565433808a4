// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::create_test_db;
use vidrelay::domain::models::downloaded_file::NewDownloadedFile;
use vidrelay::domain::repositories::downloaded_file_repository::{
    DownloadedFileRepository, RepositoryError,
};
use vidrelay::infrastructure::repositories::downloaded_file_repo_impl::DownloadedFileRepositoryImpl;

fn new_file(content_key: &str, variant: &str, owner: &str) -> NewDownloadedFile {
    NewDownloadedFile {
        content_key: content_key.to_string(),
        variant: variant.to_string(),
        quality: "1080p".to_string(),
        delivery_owner: owner.to_string(),
        session_name: "bot-a".to_string(),
        title: Some("Title".to_string()),
        poster_url: None,
        source_url: Some("https://src.test".to_string()),
    }
}

fn handles(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// 测试保存后分片编号连续
#[tokio::test]
async fn test_save_numbers_parts_from_one() {
    let repo = DownloadedFileRepositoryImpl::new(create_test_db().await);

    let file = repo
        .save_with_parts(new_file("c1", "en", "main"), &handles(&["a", "b", "c"]))
        .await
        .unwrap();
    assert!(!file.reviewed);

    let parts = repo.get_parts(file.id).await.unwrap();
    let numbered: Vec<(i32, &str)> = parts
        .iter()
        .map(|p| (p.part_number, p.delivery_file_id.as_str()))
        .collect();
    assert_eq!(numbered, vec![(1, "a"), (2, "b"), (3, "c")]);

    let found = repo.find_by_content("c1", "en").await.unwrap().unwrap();
    assert_eq!(found.id, file.id);
    assert!(repo.find_by_content("c1", "de").await.unwrap().is_none());
}

/// 测试没有分片时拒绝保存
#[tokio::test]
async fn test_save_requires_parts() {
    let repo = DownloadedFileRepositoryImpl::new(create_test_db().await);

    let err = repo
        .save_with_parts(new_file("c1", "en", "main"), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Invalid(_)));
    assert!(repo.find_by_content("c1", "en").await.unwrap().is_none());
}

/// 测试同一内容/变体的保存会替换旧记录
#[tokio::test]
async fn test_save_replaces_existing_variant() {
    let repo = DownloadedFileRepositoryImpl::new(create_test_db().await);

    let old = repo
        .save_with_parts(new_file("c1", "en", "main"), &handles(&["old-1", "old-2"]))
        .await
        .unwrap();
    let new = repo
        .save_with_parts(new_file("c1", "en", "backup"), &handles(&["new-1"]))
        .await
        .unwrap();

    assert!(repo.get_parts(old.id).await.unwrap().is_empty());
    let current = repo.find_by_content("c1", "en").await.unwrap().unwrap();
    assert_eq!(current.id, new.id);
    assert_eq!(current.delivery_owner, "backup");
    assert_eq!(repo.list_handles().await.unwrap().len(), 1);
}

/// 测试按内容列出变体
#[tokio::test]
async fn test_list_by_content_key_orders_by_variant() {
    let repo = DownloadedFileRepositoryImpl::new(create_test_db().await);
    for variant in ["ru", "en", "de"] {
        repo.save_with_parts(new_file("c1", variant, "main"), &handles(&[variant]))
            .await
            .unwrap();
    }
    repo.save_with_parts(new_file("c2", "en", "main"), &handles(&["other"]))
        .await
        .unwrap();

    let variants: Vec<String> = repo
        .list_by_content_key("c1")
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.variant)
        .collect();
    assert_eq!(variants, vec!["de", "en", "ru"]);
}

/// 测试失效句柄清理整条文件
#[tokio::test]
async fn test_cleanup_removes_file_and_all_parts() {
    let repo = DownloadedFileRepositoryImpl::new(create_test_db().await);
    let doomed = repo
        .save_with_parts(new_file("c1", "en", "main"), &handles(&["x1", "x2", "x3"]))
        .await
        .unwrap();
    let kept = repo
        .save_with_parts(new_file("c2", "en", "main"), &handles(&["y1"]))
        .await
        .unwrap();

    let outcome = repo.cleanup_expired_file("x2").await.unwrap();
    assert_eq!(outcome.deleted_parts, 3);
    assert!(outcome.deleted_file);

    assert!(repo.get_parts(doomed.id).await.unwrap().is_empty());
    assert!(repo.find_by_content("c1", "en").await.unwrap().is_none());
    assert_eq!(repo.get_parts(kept.id).await.unwrap().len(), 1);

    let again = repo.cleanup_expired_file("x2").await.unwrap();
    assert_eq!(again.deleted_parts, 0);
    assert!(!again.deleted_file);
}

/// 测试句柄列表带有上传凭据
#[tokio::test]
async fn test_list_handles_carries_owner() {
    let repo = DownloadedFileRepositoryImpl::new(create_test_db().await);
    repo.save_with_parts(new_file("c1", "en", "main"), &handles(&["a1", "a2"]))
        .await
        .unwrap();
    repo.save_with_parts(new_file("c2", "en", "backup"), &handles(&["b1"]))
        .await
        .unwrap();

    let mut listed: Vec<(String, String)> = repo
        .list_handles()
        .await
        .unwrap()
        .into_iter()
        .map(|h| (h.delivery_file_id, h.delivery_owner))
        .collect();
    listed.sort();
    assert_eq!(
        listed,
        vec![
            ("a1".to_string(), "main".to_string()),
            ("a2".to_string(), "main".to_string()),
            ("b1".to_string(), "backup".to_string()),
        ]
    );
}
