// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use super::account_pool::AccountPool;
use super::client::DeliveryCredential;
use super::uploader::{UploadError, Uploader};
use crate::domain::services::notifier::OperatorNotifier;
use crate::media::{MediaError, PreparedPart, Splitter};

/// 单个分片的上传进度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartProgress {
    pub part_number: u32,
    pub percent: f64,
}

/// 一次完整投递的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// 成功的外层凭据名称
    pub credential: String,
    /// 上传第一个分片的身份
    pub session_name: String,
    /// 按分片顺序排列的句柄
    pub handles: Vec<String>,
    /// 拆分计划中的分片数
    pub planned_parts: usize,
}

#[derive(Error, Debug)]
pub enum DeliveryFailure {
    #[error("No delivery credential configured")]
    NoCredentials,

    #[error("Could not prepare parts: {0}")]
    Split(#[from] MediaError),

    #[error("All {attempted} delivery credentials failed, last error: {last_error}")]
    AllCredentialsFailed { attempted: usize, last_error: String },
}

/// 投递服务
///
/// 拆分文件后按打乱的顺序尝试每个外层凭据；每个凭据下分片严格按序上传，
/// 任一分片失败即放弃该凭据下的整个文件。
pub struct DeliveryService {
    splitter: Splitter,
    pool: Arc<AccountPool>,
    uploader: Uploader,
    credentials: Vec<DeliveryCredential>,
    notifier: Arc<dyn OperatorNotifier>,
}

impl DeliveryService {
    pub fn new(
        splitter: Splitter,
        pool: Arc<AccountPool>,
        uploader: Uploader,
        credentials: Vec<DeliveryCredential>,
        notifier: Arc<dyn OperatorNotifier>,
    ) -> Self {
        Self {
            splitter,
            pool,
            uploader,
            credentials,
            notifier,
        }
    }

    pub fn credentials(&self) -> &[DeliveryCredential] {
        &self.credentials
    }

    /// 投递一个本地文件
    ///
    /// # 参数
    ///
    /// * `task_id` - 所属任务，用于日志与通知
    /// * `path` - 合并后的文件
    /// * `progress` - 分片进度接收端
    ///
    /// # 返回值
    ///
    /// * `Ok(DeliveryOutcome)` - 所有分片都已上传
    /// * `Err(DeliveryFailure)` - 拆分失败或所有凭据都失败
    #[instrument(skip(self, task_id, path, progress), fields(task_id = %task_id))]
    pub async fn deliver(
        &self,
        task_id: &str,
        path: &Path,
        progress: Option<&mpsc::UnboundedSender<PartProgress>>,
    ) -> Result<DeliveryOutcome, DeliveryFailure> {
        if self.credentials.is_empty() {
            return Err(DeliveryFailure::NoCredentials);
        }

        let parts = self.splitter.prepare(path).await?;
        let mut order: Vec<&DeliveryCredential> = self.credentials.iter().collect();
        order.shuffle(&mut rand::rng());

        // Identities that failed authentication stay excluded for the whole task
        let mut excluded: HashSet<String> = HashSet::new();
        let mut last_error = String::new();

        for credential in &order {
            match self
                .deliver_parts(credential, &parts, &mut excluded, progress)
                .await
            {
                Ok((session_name, handles)) => {
                    info!(
                        "Delivered {} parts via credential {}",
                        handles.len(),
                        credential.name
                    );
                    return Ok(DeliveryOutcome {
                        credential: credential.name.clone(),
                        session_name,
                        handles,
                        planned_parts: parts.len(),
                    });
                }
                Err(e) => {
                    warn!("Credential {} failed: {}", credential.name, e);
                    self.notifier
                        .notify(&format!(
                            "[{}] Upload via {} abandoned: {}",
                            task_id, credential.name, e
                        ))
                        .await;
                    last_error = e;
                }
            }
        }

        error!("All delivery credentials failed");
        Err(DeliveryFailure::AllCredentialsFailed {
            attempted: order.len(),
            last_error,
        })
    }

    async fn deliver_parts(
        &self,
        credential: &DeliveryCredential,
        parts: &[PreparedPart],
        excluded: &mut HashSet<String>,
        progress: Option<&mpsc::UnboundedSender<PartProgress>>,
    ) -> Result<(String, Vec<String>), String> {
        let mut handles = Vec::with_capacity(parts.len());
        let mut session_name = String::new();

        for part in parts {
            let (identity, handle) = self
                .upload_part(credential, part, excluded, progress)
                .await
                .map_err(|e| format!("part {} failed: {}", part.part_number, e))?;
            if part.part_number == 1 {
                session_name = identity;
            }
            handles.push(handle);
        }
        Ok((session_name, handles))
    }

    /// 上传单个分片，认证失败时换下一个身份重试同一分片
    async fn upload_part(
        &self,
        credential: &DeliveryCredential,
        part: &PreparedPart,
        excluded: &mut HashSet<String>,
        progress: Option<&mpsc::UnboundedSender<PartProgress>>,
    ) -> Result<(String, String), String> {
        let part_number = part.part_number;
        let report = move |sent: u64, total: u64| {
            if let Some(tx) = progress {
                let percent = if total == 0 {
                    0.0
                } else {
                    (sent as f64 / total as f64 * 100.0).floor()
                };
                let _ = tx.send(PartProgress {
                    part_number,
                    percent,
                });
            }
        };

        loop {
            let lease = self.pool.acquire(excluded).await.map_err(|e| e.to_string())?;
            let key = lease.identity().key.clone();

            let result = self
                .uploader
                .upload_with_retry(&lease, &credential.destination, &part.path, &report)
                .await;
            drop(lease);

            match result {
                Ok(handle) => {
                    self.pool.record_success(&key).await;
                    return Ok((key, handle));
                }
                Err(UploadError::Auth { identity, reason }) => {
                    self.pool.record_error(&identity, &reason).await;
                    self.notifier
                        .notify(&format!(
                            "Delivery identity {} failed authentication: {}",
                            identity, reason
                        ))
                        .await;
                    excluded.insert(identity);
                }
                Err(e) => {
                    self.pool.record_error(&key, &e.to_string()).await;
                    return Err(e.to_string());
                }
            }
        }
    }
}
