// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use migration::{Migrator, MigratorTrait};
use vidrelay::application::status_tracker::StatusTracker;
use vidrelay::application::use_cases::submit_download::SubmitDownloadUseCase;
use vidrelay::config::settings::Settings;
use vidrelay::delivery::{
    AccountPool, DeliveryClient, DeliveryCredential, DeliveryIdentity, DeliveryService,
    HttpDeliveryClient, UploadPolicy, Uploader,
};
use vidrelay::domain::repositories::account_stats_repository::AccountStatsRepository;
use vidrelay::domain::repositories::downloaded_file_repository::DownloadedFileRepository;
use vidrelay::infrastructure::cache::redis_client::RedisClient;
use vidrelay::infrastructure::cache::state_store::StateStore;
use vidrelay::infrastructure::database::connection;
use vidrelay::infrastructure::repositories::account_stats_repo_impl::AccountStatsRepositoryImpl;
use vidrelay::infrastructure::repositories::downloaded_file_repo_impl::DownloadedFileRepositoryImpl;
use vidrelay::infrastructure::services::http_extractor::HttpExtractor;
use vidrelay::infrastructure::services::notifier_impl::build_notifier;
use vidrelay::media::{FfmpegToolkit, MediaToolkit, Splitter};
use vidrelay::monitor::{build_rotator, HealthReporter, RateLimitMonitor};
use vidrelay::presentation::routes::{self, ApiContext};
use vidrelay::queue::{StoreTaskQueue, TaskQueue};
use vidrelay::utils::telemetry;
use vidrelay::workers::{
    Dispatcher, FileValidator, PipelineExecutor, SessionReaper, WorkerManager,
};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting vidrelay...");

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    vidrelay::infrastructure::metrics::init_metrics(&settings.server.metrics_addr);

    // 3. Connect to database
    let db = connection::create_pool(&settings.database).await?;
    let db = Arc::new(db);
    info!("Database connection established");

    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Ephemeral store
    let redis_client = RedisClient::new(&settings.redis.url).await?;
    if let Err(e) = redis_client.ping().await {
        warn!("Redis not reachable yet: {}", e);
    }
    let store: Arc<dyn StateStore> = Arc::new(redis_client);
    info!("Redis client initialized");

    // 5. Initialize Components
    let queue: Arc<dyn TaskQueue> = Arc::new(StoreTaskQueue::new(store.clone()));
    let tracker = Arc::new(StatusTracker::new(
        store.clone(),
        queue.clone(),
        settings.pipeline.status_ttl(),
        settings.pipeline.result_ttl(),
    ));
    let files: Arc<dyn DownloadedFileRepository> =
        Arc::new(DownloadedFileRepositoryImpl::new(db.clone()));
    let stats: Arc<dyn AccountStatsRepository> =
        Arc::new(AccountStatsRepositoryImpl::new(db.clone()));
    let notifier = build_notifier(&settings.notifier);

    let (reporter, health_signals) = HealthReporter::channel();
    let monitor = Arc::new(RateLimitMonitor::new(
        (&settings.rate_limit).into(),
        build_rotator(&settings.rate_limit),
        notifier.clone(),
    ));

    let http_client = Arc::new(HttpDeliveryClient::new(&settings.delivery.api_base));
    let delivery_client: Arc<dyn DeliveryClient> = http_client.clone();
    let identities: Vec<DeliveryIdentity> =
        settings.delivery.identities.iter().map(Into::into).collect();
    let credentials: Vec<DeliveryCredential> =
        settings.delivery.credentials.iter().map(Into::into).collect();
    info!(
        "Delivery configured with {} identities and {} credentials",
        identities.len(),
        credentials.len()
    );

    let media: Arc<dyn MediaToolkit> = Arc::new(FfmpegToolkit::from_settings(&settings.media));
    let pool = Arc::new(AccountPool::new(
        identities,
        stats,
        settings.delivery.quota_reset()?,
    ));
    let delivery = Arc::new(DeliveryService::new(
        Splitter::new(
            media.clone(),
            settings.delivery.size_limit_bytes(),
            settings.delivery.min_part_duration_secs,
        ),
        pool,
        Uploader::new(
            delivery_client.clone(),
            reporter,
            UploadPolicy::from(&settings.delivery),
        ),
        credentials.clone(),
        notifier.clone(),
    ));

    let extractor = Arc::new(HttpExtractor::new(
        &settings.extraction.service_url,
        std::time::Duration::from_secs(settings.extraction.timeout_secs),
    )?);
    let executor = Arc::new(PipelineExecutor::new(
        extractor,
        media,
        delivery,
        files.clone(),
        tracker.clone(),
        queue.clone(),
        notifier,
        settings.pipeline.max_concurrent_merges,
        (&settings.pipeline).into(),
    ));

    // 6. Start Workers
    let mut worker_manager = WorkerManager::new();
    worker_manager.start_monitor(monitor.clone(), health_signals);
    worker_manager.start_dispatcher(Dispatcher::new(
        store.clone(),
        queue.clone(),
        executor,
        (&settings.pipeline).into(),
    ));
    if settings.validator.enabled {
        worker_manager.start_validator(FileValidator::new(
            files.clone(),
            delivery_client,
            &credentials,
            (&settings.validator).into(),
        ));
    }
    worker_manager.start_session_reaper(SessionReaper::new(http_client, &settings.delivery));

    // 7. Start HTTP server
    let submit = Arc::new(SubmitDownloadUseCase::new(
        store,
        queue,
        tracker.clone(),
        settings.pipeline.status_ttl(),
        settings.pipeline.max_active_per_requester,
    ));
    let app = routes::app(ApiContext {
        submit,
        tracker,
        files,
        monitor,
    });

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => result?,
        _ = worker_manager.wait_for_shutdown() => {}
    }

    Ok(())
}
