// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

use super::state_store::{StateStore, StoreError};

/// Redis客户端
///
/// 提供对Redis数据库的异步操作接口，是生产环境的临时存储实现
#[derive(Clone)]
pub struct RedisClient {
    /// Redis客户端
    client: redis::Client,
}

impl RedisClient {
    /// 创建新的Redis客户端实例
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    ///
    /// # 返回值
    ///
    /// * `Ok(RedisClient)` - Redis客户端实例
    /// * `Err(StoreError)` - URL 无效
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// 检查连通性
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl StateStore for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.connection().await?;
        let value: Option<String> = con.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        match ttl {
            Some(ttl) => {
                con.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                    .await?
            }
            None => con.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut con)
            .await?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.expire::<_, ()>(key, ttl.as_secs().max(1) as i64).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut con = self.connection().await?;
        let value: i64 = con.incr(key, 1).await?;
        Ok(value)
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        let mut con = self.connection().await?;
        let value: i64 = con.decr(key, 1).await?;
        Ok(value)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        let mut con = self.connection().await?;
        let len: i64 = con.rpush(key, value).await?;
        Ok(len)
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.connection().await?;
        let value: Option<String> = con.lpop(key, None).await?;
        Ok(value)
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut con = self.connection().await?;
        let values: Vec<String> = con.lrange(key, 0, -1).await?;
        Ok(values)
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        let mut con = self.connection().await?;
        let len: usize = con.llen(key).await?;
        Ok(len)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut con = self.connection().await?;
        let values: HashMap<String, String> = con.hgetall(key).await?;
        Ok(values)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<i64, StoreError> {
        let mut con = self.connection().await?;
        let (size,): (i64,) = redis::pipe()
            .atomic()
            .sadd(key, member)
            .ignore()
            .scard(key)
            .query_async(&mut con)
            .await?;
        Ok(size)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.srem::<_, _, ()>(key, member).await?;
        Ok(())
    }
}
