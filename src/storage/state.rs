use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::CrawlResult;

/// Persistence for last-crawl timestamps beyond process lifetime
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrawlStateStore: Send + Sync {
    /// When `url` was last crawled, if ever
    async fn get_last_crawl_time(&self, url: &str) -> CrawlResult<Option<DateTime<Utc>>>;

    /// Record that `url` was crawled at `crawled_at`
    async fn set_last_crawl_time(&self, url: &str, crawled_at: DateTime<Utc>) -> CrawlResult<()>;
}

/// Process-local store, useful for one-shot runs and tests
#[derive(Debug, Default)]
pub struct MemoryCrawlStore {
    times: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryCrawlStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.times.lock().await.len()
    }
}

#[async_trait]
impl CrawlStateStore for MemoryCrawlStore {
    async fn get_last_crawl_time(&self, url: &str) -> CrawlResult<Option<DateTime<Utc>>> {
        Ok(self.times.lock().await.get(url).copied())
    }

    async fn set_last_crawl_time(&self, url: &str, crawled_at: DateTime<Utc>) -> CrawlResult<()> {
        self.times.lock().await.insert(url.to_string(), crawled_at);
        Ok(())
    }
}
