// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// 临时存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Wrong value type for key {0}")]
    WrongType(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 临时键值存储特质
///
/// 任务状态、队列内容、重复抑制和计数器都存放在这里。
/// 值是不透明字符串，键可以带过期时间。
#[async_trait]
pub trait StateStore: Send + Sync {
    /// 读取字符串值
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 写入字符串值，`ttl` 为 `None` 时永不过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// 仅当键不存在时写入，返回是否写入成功
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// 删除键
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// 设置过期时间
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// 原子加一，返回新值
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// 原子减一，返回新值
    async fn decr(&self, key: &str) -> Result<i64, StoreError>;

    /// 追加到列表尾部，返回列表长度
    async fn rpush(&self, key: &str, value: &str) -> Result<i64, StoreError>;

    /// 弹出列表头部
    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 返回整个列表
    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// 列表长度，键不存在时为 0
    async fn llen(&self, key: &str) -> Result<usize, StoreError>;

    /// 写入哈希字段
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// 读取整个哈希
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// 加入集合，返回集合大小
    async fn sadd(&self, key: &str, member: &str) -> Result<i64, StoreError>;

    /// 从集合移除
    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;
}
