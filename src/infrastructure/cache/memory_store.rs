// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::state_store::{StateStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

/// 进程内临时存储
///
/// 语义与 Redis 实现一致（含过期时间），用于测试和单机开发。
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, Entry>>,
    offline: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟存储不可达
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    /// 在锁内执行操作，先清理已过期的键
    fn with_live<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_online()?;
        let mut entries = self.entries.lock();
        let expired = entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            entries.remove(key);
        }
        f(&mut entries)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType(key.to_string())
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_live(key, |entries| match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.with_live(key, |entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(value.to_string()),
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                },
            );
            Ok(())
        })
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.with_live(key, |entries| {
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(value.to_string()),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            Ok(true)
        })
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.with_live(key, |entries| {
            entries.remove(key);
            Ok(())
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.with_live(key, |entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
            Ok(())
        })
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.with_live(key, |entries| add_to_counter(entries, key, 1))
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        self.with_live(key, |entries| add_to_counter(entries, key, -1))
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        self.with_live(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::List(VecDeque::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::List(list) => {
                    list.push_back(value.to_string());
                    Ok(list.len() as i64)
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_live(key, |entries| {
            let popped = match entries.get_mut(key) {
                None => return Ok(None),
                Some(Entry {
                    value: Value::List(list),
                    ..
                }) => (list.pop_front(), list.is_empty()),
                Some(_) => return Err(wrong_type(key)),
            };
            if popped.1 {
                entries.remove(key);
            }
            Ok(popped.0)
        })
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with_live(key, |entries| match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        self.with_live(key, |entries| match entries.get(key) {
            None => Ok(0),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.len()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.with_live(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Hash(hash) => {
                    hash.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.with_live(key, |entries| match entries.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<i64, StoreError> {
        self.with_live(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Set(HashSet::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Set(set) => {
                    set.insert(member.to_string());
                    Ok(set.len() as i64)
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.with_live(key, |entries| {
            let now_empty = match entries.get_mut(key) {
                None => return Ok(()),
                Some(Entry {
                    value: Value::Set(set),
                    ..
                }) => {
                    set.remove(member);
                    set.is_empty()
                }
                Some(_) => return Err(wrong_type(key)),
            };
            if now_empty {
                entries.remove(key);
            }
            Ok(())
        })
    }
}

fn add_to_counter(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    delta: i64,
) -> Result<i64, StoreError> {
    let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
        value: Value::Str("0".to_string()),
        expires_at: None,
    });
    match &mut entry.value {
        Value::Str(s) => {
            let current: i64 = s.parse().map_err(|_| wrong_type(key))?;
            let next = current + delta;
            *s = next.to_string();
            Ok(next)
        }
        _ => Err(wrong_type(key)),
    }
}
