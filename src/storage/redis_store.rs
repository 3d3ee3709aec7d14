use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::{Client, aio::MultiplexedConnection};
use tracing::debug;
use tokio::sync::Mutex;
use std::sync::Arc;

use crate::error::{CrawlError, CrawlResult};
use crate::storage::state::CrawlStateStore;

const LAST_CRAWL_KEY: &str = "crawler:last_crawl";

/// Last-crawl timestamps kept in a Redis hash (url -> unix millis)
pub struct RedisCrawlStore {
    /// Hash holding the timestamps
    key: String,

    /// Shared connection
    conn_pool: Arc<Mutex<MultiplexedConnection>>,
}

impl RedisCrawlStore {
    /// Connect to Redis at `redis_url`
    pub async fn connect(redis_url: &str) -> CrawlResult<Self> {
        Self::connect_with_key(redis_url, LAST_CRAWL_KEY).await
    }

    /// Connect using a custom hash key, to keep separate crawls apart
    pub async fn connect_with_key(redis_url: &str, key: &str) -> CrawlResult<Self> {
        let client = Client::open(redis_url)?;

        let conn = client.get_multiplexed_async_connection().await?;
        debug!("Connected to Redis state store at {}", redis_url);

        Ok(Self {
            key: key.to_string(),
            conn_pool: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl CrawlStateStore for RedisCrawlStore {
    async fn get_last_crawl_time(&self, url: &str) -> CrawlResult<Option<DateTime<Utc>>> {
        let mut conn = self.conn_pool.lock().await;

        let millis: Option<i64> = redis::cmd("HGET")
            .arg(&self.key)
            .arg(url)
            .query_async(&mut *conn)
            .await?;

        match millis {
            Some(millis) => Utc.timestamp_millis_opt(millis)
                .single()
                .map(Some)
                .ok_or_else(|| CrawlError::Storage(format!("Invalid timestamp stored for {}: {}", url, millis))),
            None => Ok(None),
        }
    }

    async fn set_last_crawl_time(&self, url: &str, crawled_at: DateTime<Utc>) -> CrawlResult<()> {
        let mut conn = self.conn_pool.lock().await;

        redis::cmd("HSET")
            .arg(&self.key)
            .arg(url)
            .arg(crawled_at.timestamp_millis())
            .query_async::<_, ()>(&mut *conn)
            .await?;

        debug!("Stored last crawl time for {}", url);

        Ok(())
    }
}
