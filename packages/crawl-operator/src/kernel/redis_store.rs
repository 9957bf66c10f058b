//! Redis-backed progress store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;

use crate::kernel::{BaseProgressStore, BaseProgressStoreConnector};

pub struct RedisProgressStore {
    conn: MultiplexedConnection,
}

impl RedisProgressStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid progress store URL")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to progress store")?;
        Ok(Self { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl BaseProgressStore for RedisProgressStore {
    async fn ping(&self) -> Result<()> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.conn())
            .await
            .context("PING failed")?;
        Ok(())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .conn()
            .lpop(key, None)
            .await
            .with_context(|| format!("LPOP {} failed", key))?;
        Ok(value)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let values: Vec<String> = self
            .conn()
            .lrange(key, start, stop)
            .await
            .with_context(|| format!("LRANGE {} failed", key))?;
        Ok(values)
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        let len: u64 = self
            .conn()
            .llen(key)
            .await
            .with_context(|| format!("LLEN {} failed", key))?;
        Ok(len)
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let len: u64 = self
            .conn()
            .scard(key)
            .await
            .with_context(|| format!("SCARD {} failed", key))?;
        Ok(len)
    }

    async fn get_counter(&self, key: &str) -> Result<u64> {
        let value: Option<u64> = self
            .conn()
            .get(key)
            .await
            .with_context(|| format!("GET {} failed", key))?;
        Ok(value.unwrap_or(0))
    }

    async fn incr_by(&self, key: &str, delta: u64) -> Result<u64> {
        let value: u64 = self
            .conn()
            .incr(key, delta)
            .await
            .with_context(|| format!("INCRBY {} failed", key))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _: () = self
            .conn()
            .set(key, value)
            .await
            .with_context(|| format!("SET {} failed", key))?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let set: bool = self
            .conn()
            .set_nx(key, value)
            .await
            .with_context(|| format!("SETNX {} failed", key))?;
        Ok(set)
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>> {
        let values: Vec<String> = self
            .conn()
            .hvals(key)
            .await
            .with_context(|| format!("HVALS {} failed", key))?;
        Ok(values)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .conn()
            .hget(key, field)
            .await
            .with_context(|| format!("HGET {} {} failed", key, field))?;
        Ok(value)
    }
}

/// Opens a fresh multiplexed connection per crawl.
#[derive(Debug, Clone, Default)]
pub struct RedisConnector;

#[async_trait]
impl BaseProgressStoreConnector for RedisConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn BaseProgressStore>> {
        let store = RedisProgressStore::connect(url).await?;
        Ok(Arc::new(store))
    }
}
