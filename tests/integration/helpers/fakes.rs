// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use vidrelay::delivery::{
    DeliveryClient, DeliveryError, DeliveryIdentity, HandleStatus, UploadProgressFn,
};
use vidrelay::domain::models::task::MergeProgress;
use vidrelay::domain::models::upload_account::UploadAccountStats;
use vidrelay::domain::repositories::account_stats_repository::AccountStatsRepository;
use vidrelay::domain::repositories::downloaded_file_repository::RepositoryError;
use vidrelay::domain::services::extraction_service::{
    ExtractionError, ExtractionResult, Extractor,
};
use vidrelay::domain::services::notifier::OperatorNotifier;
use vidrelay::media::{MediaError, MediaToolkit, MergeProgressFn};

pub fn sample_extraction() -> ExtractionResult {
    ExtractionResult {
        quality: "1080p".to_string(),
        media_url: "https://cdn.test/master.m3u8".to_string(),
        request_headers: HashMap::from([("Referer".to_string(), "https://src.test".to_string())]),
        title: Some("Sample".to_string()),
        poster_url: None,
    }
}

/// 按脚本返回结果的提取服务，脚本用完后总是返回成功
#[derive(Default)]
pub struct FakeExtractor {
    script: Mutex<VecDeque<Result<Option<ExtractionResult>, ExtractionError>>>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn push(&self, result: Result<Option<ExtractionResult>, ExtractionError>) {
        self.script.lock().push_back(result);
    }

    pub fn always_empty(&self, times: usize) {
        for _ in 0..times {
            self.push(Ok(None));
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(
        &self,
        _source_url: &str,
        _variant: &str,
    ) -> Result<Option<ExtractionResult>, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(Some(sample_extraction())))
    }
}

/// 写出固定大小文件的媒体工具
pub struct FakeMedia {
    pub merged_size: Mutex<usize>,
    pub duration_secs: f64,
    pub segments: u32,
    pub cuts: Mutex<Vec<(f64, Option<f64>)>>,
}

impl FakeMedia {
    pub fn new(merged_size: usize) -> Self {
        Self {
            merged_size: Mutex::new(merged_size),
            duration_secs: 3600.0,
            segments: 4,
            cuts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaToolkit for FakeMedia {
    async fn merge(
        &self,
        _manifest_url: &str,
        _headers: &HashMap<String, String>,
        output: &Path,
        on_progress: MergeProgressFn<'_>,
    ) -> Result<(), MediaError> {
        for done in 1..=self.segments {
            on_progress(MergeProgress::new(done, self.segments));
        }
        let size = *self.merged_size.lock();
        tokio::fs::write(output, vec![7u8; size]).await?;
        Ok(())
    }

    async fn probe_duration(&self, _input: &Path) -> Result<f64, MediaError> {
        Ok(self.duration_secs)
    }

    async fn cut(
        &self,
        _input: &Path,
        start_secs: f64,
        duration_secs: Option<f64>,
        output: &Path,
    ) -> Result<(), MediaError> {
        self.cuts.lock().push((start_secs, duration_secs));
        tokio::fs::write(output, vec![1u8; 64]).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub identity: String,
    pub destination: String,
    pub file_name: String,
    pub handle: String,
}

/// 可以按身份或目标注入失败的投递客户端
#[derive(Default)]
pub struct FakeDeliveryClient {
    pub auth_failures: Mutex<HashSet<String>>,
    pub broken_destinations: Mutex<HashSet<String>>,
    pub expired_handles: Mutex<HashSet<String>>,
    pub uploads: Mutex<Vec<UploadRecord>>,
    pub attempts: AtomicUsize,
    next_handle: AtomicUsize,
}

impl FakeDeliveryClient {
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl DeliveryClient for FakeDeliveryClient {
    async fn send_file(
        &self,
        identity: &DeliveryIdentity,
        destination: &str,
        path: &Path,
        progress: UploadProgressFn<'_>,
    ) -> Result<String, DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.auth_failures.lock().contains(&identity.key) {
            return Err(DeliveryError::Auth("session revoked".to_string()));
        }
        if self.broken_destinations.lock().contains(destination) {
            return Err(DeliveryError::Network("connection reset".to_string()));
        }

        let total = tokio::fs::metadata(path)
            .await
            .map_err(|e| DeliveryError::Unknown(e.to_string()))?
            .len();
        progress(total / 2, total);
        progress(total, total);

        let handle = format!(
            "handle-{}",
            self.next_handle.fetch_add(1, Ordering::SeqCst) + 1
        );
        self.uploads.lock().push(UploadRecord {
            identity: identity.key.clone(),
            destination: destination.to_string(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            handle: handle.clone(),
        });
        Ok(handle)
    }

    async fn check_handle(
        &self,
        _credential_token: &str,
        handle: &str,
    ) -> Result<HandleStatus, DeliveryError> {
        if self.expired_handles.lock().contains(handle) {
            Ok(HandleStatus::Expired)
        } else {
            Ok(HandleStatus::Valid)
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl OperatorNotifier for RecordingNotifier {
    async fn notify(&self, text: &str) {
        self.messages.lock().push(text.to_string());
    }
}

/// 进程内的身份统计
#[derive(Default)]
pub struct InMemoryStatsRepo {
    rows: Mutex<HashMap<String, UploadAccountStats>>,
}

impl InMemoryStatsRepo {
    pub fn get(&self, key: &str) -> Option<UploadAccountStats> {
        self.rows.lock().get(key).cloned()
    }

    pub fn seed(&self, stats: UploadAccountStats) {
        self.rows.lock().insert(stats.identity_key.clone(), stats);
    }
}

#[async_trait]
impl AccountStatsRepository for InMemoryStatsRepo {
    async fn find_many(
        &self,
        identity_keys: &[String],
    ) -> Result<Vec<UploadAccountStats>, RepositoryError> {
        let rows = self.rows.lock();
        Ok(identity_keys
            .iter()
            .filter_map(|key| rows.get(key).cloned())
            .collect())
    }

    async fn increment_uploads(
        &self,
        identity_key: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<UploadAccountStats, RepositoryError> {
        let mut rows = self.rows.lock();
        let stats = rows
            .entry(identity_key.to_string())
            .or_insert_with(|| UploadAccountStats::new(identity_key));
        stats.register_upload(today, now);
        Ok(stats.clone())
    }

    async fn record_error(&self, identity_key: &str, error: &str) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock();
        let stats = rows
            .entry(identity_key.to_string())
            .or_insert_with(|| UploadAccountStats::new(identity_key));
        stats.last_error = Some(error.to_string());
        Ok(())
    }
}
