// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::settings::ValidatorSettings;
use crate::delivery::{DeliveryClient, DeliveryCredential, HandleStatus};
use crate::domain::models::downloaded_file::StoredHandle;
use crate::domain::repositories::downloaded_file_repository::{
    DownloadedFileRepository, RepositoryError,
};
use crate::infrastructure::metrics::EXPIRED_FILES_CLEANED;

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub check_timeout: Duration,
}

impl From<&ValidatorSettings> for ValidatorConfig {
    fn from(settings: &ValidatorSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            batch_size: settings.batch_size.max(1),
            batch_delay: Duration::from_secs(settings.batch_delay_secs),
            jitter_min_ms: settings.jitter_min_ms,
            jitter_max_ms: settings.jitter_max_ms.max(settings.jitter_min_ms),
            check_timeout: Duration::from_secs(settings.check_timeout_secs),
        }
    }
}

/// 一轮校验的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub checked: usize,
    pub expired: usize,
    pub skipped: usize,
    pub deleted_parts: u64,
}

/// 已存句柄校验器
///
/// 周期性地用上传时的外层凭据检查每个分片句柄，只有平台明确答复
/// 句柄失效时才删除整条文件记录；网络错误或超时一律跳过，留到下一轮。
pub struct FileValidator {
    files: Arc<dyn DownloadedFileRepository>,
    client: Arc<dyn DeliveryClient>,
    /// 凭据名称 → 令牌
    tokens: HashMap<String, String>,
    config: ValidatorConfig,
}

impl FileValidator {
    pub fn new(
        files: Arc<dyn DownloadedFileRepository>,
        client: Arc<dyn DeliveryClient>,
        credentials: &[DeliveryCredential],
        config: ValidatorConfig,
    ) -> Self {
        let tokens = credentials
            .iter()
            .map(|c| (c.name.clone(), c.token.clone()))
            .collect();
        Self {
            files,
            client,
            tokens,
            config,
        }
    }

    /// 运行校验器
    pub async fn run(&self) {
        info!(
            "File validator started (every {}s)",
            self.config.interval.as_secs()
        );

        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            interval.tick().await;

            match self.validate_once().await {
                Ok(report) => {
                    info!(
                        "Validation pass: {} checked, {} expired, {} skipped",
                        report.checked, report.expired, report.skipped
                    );
                }
                Err(e) => {
                    error!("Validation pass failed: {}", e);
                }
            }
        }
    }

    /// 启动后台运行
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// 执行一轮完整校验
    pub async fn validate_once(&self) -> Result<ValidationReport, RepositoryError> {
        let handles = self.files.list_handles().await?;
        let mut by_owner: BTreeMap<String, Vec<StoredHandle>> = BTreeMap::new();
        for handle in handles {
            by_owner
                .entry(handle.delivery_owner.clone())
                .or_default()
                .push(handle);
        }

        let mut report = ValidationReport::default();
        let mut removed: HashSet<Uuid> = HashSet::new();
        let mut first_check = true;

        for (owner, handles) in by_owner {
            let token = match self.tokens.get(&owner) {
                Some(token) => token,
                None => {
                    warn!(
                        "No credential named {} configured, skipping {} handles",
                        owner,
                        handles.len()
                    );
                    report.skipped += handles.len();
                    continue;
                }
            };

            let batches: Vec<&[StoredHandle]> = handles.chunks(self.config.batch_size).collect();
            let batch_count = batches.len();
            for (index, batch) in batches.into_iter().enumerate() {
                for handle in batch {
                    if removed.contains(&handle.file_id) {
                        continue;
                    }
                    if !first_check {
                        tokio::time::sleep(self.jitter()).await;
                    }
                    first_check = false;

                    self.check(token, handle, &mut report, &mut removed).await;
                }

                if index + 1 < batch_count {
                    tokio::time::sleep(self.config.batch_delay).await;
                }
            }
        }

        Ok(report)
    }

    async fn check(
        &self,
        token: &str,
        handle: &StoredHandle,
        report: &mut ValidationReport,
        removed: &mut HashSet<Uuid>,
    ) {
        let status = tokio::time::timeout(
            self.config.check_timeout,
            self.client.check_handle(token, &handle.delivery_file_id),
        )
        .await;

        match status {
            Ok(Ok(HandleStatus::Valid)) => {
                report.checked += 1;
            }
            Ok(Ok(HandleStatus::Expired)) => {
                report.checked += 1;
                match self
                    .files
                    .cleanup_expired_file(&handle.delivery_file_id)
                    .await
                {
                    Ok(outcome) => {
                        report.expired += 1;
                        report.deleted_parts += outcome.deleted_parts;
                        removed.insert(handle.file_id);
                        if outcome.deleted_file {
                            counter!(EXPIRED_FILES_CLEANED).increment(1);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Cleanup of expired part {} of {} failed: {}",
                            handle.part_number, handle.file_id, e
                        );
                        report.skipped += 1;
                    }
                }
            }
            Ok(Err(e)) => {
                debug!(
                    "Could not check part {} of {}: {}",
                    handle.part_number, handle.file_id, e
                );
                report.skipped += 1;
            }
            Err(_) => {
                debug!(
                    "Check timed out for part {} of {}",
                    handle.part_number, handle.file_id
                );
                report.skipped += 1;
            }
        }
    }

    fn jitter(&self) -> Duration {
        let ms = rand::random_range(self.config.jitter_min_ms..=self.config.jitter_max_ms);
        Duration::from_millis(ms)
    }
}
