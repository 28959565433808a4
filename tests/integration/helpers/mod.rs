// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod fakes;

use axum_test::TestServer;
use chrono::{NaiveTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use vidrelay::application::dto::download_request::SubmitDownloadRequest;
use vidrelay::application::status_tracker::StatusTracker;
use vidrelay::application::use_cases::submit_download::SubmitDownloadUseCase;
use vidrelay::config::settings::DatabaseSettings;
use vidrelay::delivery::{
    AccountPool, DeliveryCredential, DeliveryIdentity, DeliveryService, UploadPolicy, Uploader,
};
use vidrelay::domain::models::task::DownloadTask;
use vidrelay::domain::models::upload_account::{quota_day, UploadAccountStats};
use vidrelay::domain::services::extraction_service::Extractor;
use vidrelay::infrastructure::cache::memory_store::MemoryStateStore;
use vidrelay::infrastructure::database::connection;
use vidrelay::infrastructure::repositories::downloaded_file_repo_impl::DownloadedFileRepositoryImpl;
use vidrelay::media::Splitter;
use vidrelay::monitor::{HealthReporter, NoopRotator, RateLimitConfig, RateLimitMonitor};
use vidrelay::presentation::routes::{self, ApiContext};
use vidrelay::queue::{StoreTaskQueue, TaskQueue};
use vidrelay::utils::retry_policy::RetryPolicy;
use vidrelay::workers::{PipelineConfig, PipelineExecutor};

use fakes::{FakeDeliveryClient, FakeExtractor, FakeMedia, InMemoryStatsRepo, RecordingNotifier};

/// 平台单文件上限（字节），测试中用小文件模拟
pub const TEST_SIZE_LIMIT: u64 = 1400;

/// 在内存 SQLite 上建立连接并执行全部迁移
pub async fn create_test_db() -> Arc<DatabaseConnection> {
    let settings = DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        max_connections: None,
        min_connections: None,
        connect_timeout: None,
        idle_timeout: None,
    };
    let db = connection::create_pool(&settings).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    Arc::new(db)
}

pub fn identity(key: &str) -> DeliveryIdentity {
    DeliveryIdentity {
        key: key.to_string(),
        token: format!("{}-token", key),
    }
}

pub fn credential(name: &str) -> DeliveryCredential {
    DeliveryCredential {
        name: name.to_string(),
        token: format!("{}-token", name),
        destination: format!("dest-{}", name),
    }
}

/// 让某个身份看起来今天已经上传过若干次
pub fn busy_today(key: &str, uploads: i32) -> UploadAccountStats {
    let mut stats = UploadAccountStats::new(key);
    let today = quota_day(Utc::now(), NaiveTime::MIN);
    for _ in 0..uploads {
        stats.register_upload(today, Utc::now());
    }
    stats
}

/// 组装好的流水线测试环境
#[allow(dead_code)]
pub struct Harness {
    pub store: Arc<MemoryStateStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub tracker: Arc<StatusTracker>,
    pub submit: Arc<SubmitDownloadUseCase>,
    pub db: Arc<DatabaseConnection>,
    pub files: Arc<DownloadedFileRepositoryImpl>,
    pub stats: Arc<InMemoryStatsRepo>,
    pub extractor: Arc<FakeExtractor>,
    pub media: Arc<FakeMedia>,
    pub client: Arc<FakeDeliveryClient>,
    pub notifier: Arc<RecordingNotifier>,
    pub monitor: Arc<RateLimitMonitor>,
    pub work_dir: TempDir,
    identities: Vec<DeliveryIdentity>,
    credentials: Vec<DeliveryCredential>,
}

impl Harness {
    pub async fn new(identities: &[&str], credentials: &[&str], merged_size: usize) -> Self {
        let store = Arc::new(MemoryStateStore::new());
        let queue: Arc<dyn TaskQueue> = Arc::new(StoreTaskQueue::new(store.clone()));
        let tracker = Arc::new(StatusTracker::new(
            store.clone(),
            queue.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(86400),
        ));
        let submit = Arc::new(SubmitDownloadUseCase::new(
            store.clone(),
            queue.clone(),
            tracker.clone(),
            Duration::from_secs(3600),
            1,
        ));
        let db = create_test_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = Arc::new(RateLimitMonitor::new(
            RateLimitConfig {
                rotation_cooldown: Duration::from_secs(30),
                detection_window: Duration::from_secs(600),
                wait_threshold_secs: 7,
                event_threshold: 7,
            },
            Arc::new(NoopRotator),
            notifier.clone(),
        ));

        Self {
            store,
            queue,
            tracker,
            submit,
            files: Arc::new(DownloadedFileRepositoryImpl::new(db.clone())),
            db,
            stats: Arc::new(InMemoryStatsRepo::default()),
            extractor: Arc::new(FakeExtractor::default()),
            media: Arc::new(FakeMedia::new(merged_size)),
            client: Arc::new(FakeDeliveryClient::default()),
            notifier,
            monitor,
            work_dir: TempDir::new().unwrap(),
            identities: identities.iter().map(|k| identity(k)).collect(),
            credentials: credentials.iter().map(|n| credential(n)).collect(),
        }
    }

    pub fn delivery(&self) -> DeliveryService {
        DeliveryService::new(
            Splitter::new(self.media.clone(), TEST_SIZE_LIMIT, 10.0),
            Arc::new(AccountPool::new(
                self.identities.clone(),
                self.stats.clone(),
                NaiveTime::MIN,
            )),
            Uploader::new(
                self.client.clone(),
                HealthReporter::disabled(),
                UploadPolicy {
                    attempt_timeout: Duration::from_secs(5),
                    retry: RetryPolicy {
                        max_attempts: 2,
                        base_delay: Duration::from_millis(5),
                        flood_wait_buffer: Duration::ZERO,
                    },
                },
            ),
            self.credentials.clone(),
            self.notifier.clone(),
        )
    }

    pub fn executor(&self, max_retries: i64) -> PipelineExecutor {
        self.executor_with(self.extractor.clone(), max_retries)
    }

    /// 使用指定提取服务组装执行器
    pub fn executor_with(&self, extractor: Arc<dyn Extractor>, max_retries: i64) -> PipelineExecutor {
        PipelineExecutor::new(
            extractor,
            self.media.clone(),
            Arc::new(self.delivery()),
            self.files.clone(),
            self.tracker.clone(),
            self.queue.clone(),
            self.notifier.clone(),
            2,
            PipelineConfig {
                max_retries,
                retry_delay: Duration::from_millis(5),
                work_dir: self.work_dir.path().to_path_buf(),
            },
        )
    }

    /// 提交一个请求并把它从队列取出，模拟调度器交给执行器
    pub async fn submit_and_take(&self, content_key: &str, requester: &str) -> DownloadTask {
        self.submit
            .execute(request(content_key, "en", requester))
            .await
            .unwrap();
        self.queue.dequeue().await.unwrap().unwrap()
    }

    pub fn server(&self) -> TestServer {
        let app = routes::app(ApiContext {
            submit: self.submit.clone(),
            tracker: self.tracker.clone(),
            files: self.files.clone(),
            monitor: self.monitor.clone(),
        });
        TestServer::new(app).unwrap()
    }
}

pub fn request(content_key: &str, variant: &str, requester: &str) -> SubmitDownloadRequest {
    SubmitDownloadRequest {
        source_url: format!("https://src.test/watch/{}", content_key),
        content_key: content_key.to_string(),
        variant: variant.to_string(),
        requester_id: requester.to_string(),
    }
}
