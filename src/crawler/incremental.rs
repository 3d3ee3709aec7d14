use chrono::{DateTime, Utc};
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::CrawlResult;
use crate::storage::CrawlStateStore;

/// Skips URLs crawled more recently than the staleness threshold
pub struct IncrementalCrawler {
    storage: Arc<dyn CrawlStateStore>,
    staleness: Duration,

    /// Most recent crawl per URL seen by this process
    last_crawl_times: RwLock<HashMap<String, DateTime<Utc>>>,

    /// SHA-256 of the last payload per URL
    content_hashes: RwLock<HashMap<String, String>>,
}

impl IncrementalCrawler {
    pub fn new(storage: Arc<dyn CrawlStateStore>, staleness: Duration) -> Self {
        Self {
            storage,
            staleness,
            last_crawl_times: RwLock::new(HashMap::new()),
            content_hashes: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `url` is due: never crawled, or last crawled longer ago than the threshold
    pub async fn should_crawl(&self, url: &str) -> bool {
        let last_crawl = match self.last_crawl_time(url).await {
            Some(last_crawl) => last_crawl,
            None => return true,
        };

        // A timestamp in the future means a clock skew; treat it as fresh
        let elapsed = (Utc::now() - last_crawl).to_std().unwrap_or(Duration::ZERO);
        let due = elapsed > self.staleness;
        if !due {
            debug!("Skipping recently crawled URL: {}", url);
        }
        due
    }

    /// Record that `url` was crawled now
    pub async fn mark_crawled(&self, url: &str) -> CrawlResult<()> {
        self.mark_crawled_at(url, Utc::now()).await
    }

    /// Record a crawl of `url` at an explicit time
    pub async fn mark_crawled_at(&self, url: &str, crawled_at: DateTime<Utc>) -> CrawlResult<()> {
        self.last_crawl_times.write().await.insert(url.to_string(), crawled_at);
        self.storage.set_last_crawl_time(url, crawled_at).await
    }

    /// Compare `content` with the previous payload for `url`, remembering the new hash
    pub async fn is_content_changed(&self, url: &str, content: &str) -> bool {
        let hash = hex::encode(Sha256::digest(content.as_bytes()));
        let mut hashes = self.content_hashes.write().await;
        match hashes.get(url) {
            Some(previous) if *previous == hash => false,
            _ => {
                hashes.insert(url.to_string(), hash);
                true
            }
        }
    }

    /// The subset of `urls` that is due for crawling, in input order
    pub async fn filter_due(&self, urls: &[String]) -> Vec<String> {
        let checks = join_all(urls.iter().map(|url| self.should_crawl(url))).await;
        urls.iter()
            .zip(checks)
            .filter(|(_, due)| *due)
            .map(|(url, _)| url.clone())
            .collect()
    }

    async fn last_crawl_time(&self, url: &str) -> Option<DateTime<Utc>> {
        if let Some(time) = self.last_crawl_times.read().await.get(url) {
            return Some(*time);
        }

        match self.storage.get_last_crawl_time(url).await {
            Ok(time) => time,
            Err(e) => {
                warn!("Failed to read last crawl time for {}: {}", url, e);
                None
            }
        }
    }
}
