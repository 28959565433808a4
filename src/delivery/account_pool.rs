// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{NaiveTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use super::client::DeliveryIdentity;
use crate::domain::models::upload_account::quota_day;
use crate::domain::repositories::account_stats_repository::AccountStatsRepository;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("No delivery identity available")]
    NoIdentity,

    #[error("Account pool closed")]
    Closed,
}

struct Slot {
    identity: DeliveryIdentity,
    lock: Arc<Semaphore>,
}

/// 已占用的上传身份
///
/// 持有期间该身份视为忙碌；释放时（包括提前返回或 panic）自动归还。
pub struct AccountLease {
    identity: DeliveryIdentity,
    _permit: OwnedSemaphorePermit,
}

impl AccountLease {
    pub fn identity(&self) -> &DeliveryIdentity {
        &self.identity
    }
}

/// 上传身份池
///
/// 固定数量的槽位，每个槽位一个单许可信号量，取得许可即取得该身份。
pub struct AccountPool {
    slots: Vec<Slot>,
    stats: Arc<dyn AccountStatsRepository>,
    quota_reset: NaiveTime,
}

impl AccountPool {
    pub fn new(
        identities: Vec<DeliveryIdentity>,
        stats: Arc<dyn AccountStatsRepository>,
        quota_reset: NaiveTime,
    ) -> Self {
        let slots = identities
            .into_iter()
            .map(|identity| Slot {
                identity,
                lock: Arc::new(Semaphore::new(1)),
            })
            .collect();
        Self {
            slots,
            stats,
            quota_reset,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 当前被占用的身份数
    pub fn busy_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.lock.available_permits() == 0)
            .count()
    }

    /// 为一次上传尝试选择身份
    ///
    /// 1. 当日上传数最少的身份中第一个空闲的；
    /// 2. 否则整个池中任意空闲的；
    /// 3. 否则排队等待池中第一个身份。
    ///
    /// # 参数
    ///
    /// * `excluded` - 本次任务中已认证失败、不得再使用的身份
    pub async fn acquire(&self, excluded: &HashSet<String>) -> Result<AccountLease, PoolError> {
        let candidates: Vec<usize> = (0..self.slots.len())
            .filter(|&i| !excluded.contains(&self.slots[i].identity.key))
            .collect();
        let first = *candidates.first().ok_or(PoolError::NoIdentity)?;

        let counts = self.today_counts(&candidates).await;
        let min = candidates
            .iter()
            .map(|&i| counts.get(&i).copied().unwrap_or(0))
            .min()
            .unwrap_or(0);

        let least_used = candidates
            .iter()
            .copied()
            .filter(|i| counts.get(i).copied().unwrap_or(0) == min);

        for index in least_used.chain(candidates.iter().copied()) {
            if let Ok(permit) = self.slots[index].lock.clone().try_acquire_owned() {
                return Ok(self.lease(index, permit));
            }
        }

        debug!(
            "All identities busy, queueing on {}",
            self.slots[first].identity.key
        );
        let permit = self.slots[first]
            .lock
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(self.lease(first, permit))
    }

    fn lease(&self, index: usize, permit: OwnedSemaphorePermit) -> AccountLease {
        AccountLease {
            identity: self.slots[index].identity.clone(),
            _permit: permit,
        }
    }

    async fn today_counts(&self, candidates: &[usize]) -> HashMap<usize, i64> {
        let keys: Vec<String> = candidates
            .iter()
            .map(|&i| self.slots[i].identity.key.clone())
            .collect();
        let today = quota_day(Utc::now(), self.quota_reset);

        let stats = match self.stats.find_many(&keys).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Could not load upload stats, using pool order: {}", e);
                return HashMap::new();
            }
        };

        let by_key: HashMap<&str, i64> = stats
            .iter()
            .map(|s| (s.identity_key.as_str(), s.uploads_on(today)))
            .collect();
        candidates
            .iter()
            .map(|&i| {
                let count = by_key
                    .get(self.slots[i].identity.key.as_str())
                    .copied()
                    .unwrap_or(0);
                (i, count)
            })
            .collect()
    }

    /// 记录一次成功上传，先做跨日检查再累加
    pub async fn record_success(&self, identity_key: &str) {
        let now = Utc::now();
        let today = quota_day(now, self.quota_reset);
        if let Err(e) = self.stats.increment_uploads(identity_key, today, now).await {
            warn!("Failed to record upload for {}: {}", identity_key, e);
        }
    }

    /// 记录身份最近一次错误
    pub async fn record_error(&self, identity_key: &str, error: &str) {
        if let Err(e) = self.stats.record_error(identity_key, error).await {
            warn!("Failed to record error for {}: {}", identity_key, e);
        }
    }
}
