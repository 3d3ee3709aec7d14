use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::browser::AntiDetectionManager;
use crate::cli::config::CrawlerConfig;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::incremental::IncrementalCrawler;
use crate::crawler::scheduler::{DispatchContext, TaskScheduler};
use crate::crawler::task::{CrawlTask, TaskPriority};
use crate::error::{CrawlError, CrawlResult};
use crate::proxy::{ProxyInfo, ProxyPool, ProxyStats};
use crate::storage::CrawlStateStore;
use crate::utils::{CrawlMonitor, MetricsSnapshot};

/// Orchestrator state at one instant
#[derive(Debug, Clone, Serialize)]
pub struct CrawlerStatus {
    pub active_proxies: usize,
    pub proxy_count: usize,

    /// Queued plus running
    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub running_tasks: usize,
    pub metrics: MetricsSnapshot,
}

/// Ties the proxy pool, identity rotation, scheduler, monitor and incremental
/// filter together behind one handle
pub struct AdvancedCrawler {
    config: CrawlerConfig,
    proxies: Arc<Mutex<ProxyPool>>,
    monitor: CrawlMonitor,
    incremental: Arc<RwLock<Option<Arc<IncrementalCrawler>>>>,
    scheduler: TaskScheduler,
}

impl AdvancedCrawler {
    /// Create a crawler with the given configuration and fetch engine
    pub fn new(config: CrawlerConfig, fetcher: Arc<dyn Fetcher>) -> CrawlResult<Self> {
        config.validate()?;

        let proxies = Arc::new(Mutex::new(ProxyPool::from_settings(&config.proxy)));
        let monitor = CrawlMonitor::new(config.monitor.clone());
        let incremental = Arc::new(RwLock::new(None));

        let scheduler = TaskScheduler::new(
            config.scheduler.clone(),
            DispatchContext {
                proxies: proxies.clone(),
                anti_detection: Arc::new(AntiDetectionManager::new()),
                monitor: monitor.clone(),
                incremental: incremental.clone(),
                fetcher,
            },
        )?;

        info!(
            "Crawler initialized with {} proxies and {} slots",
            config.proxy.proxy_list.len(),
            config.scheduler.max_concurrent
        );

        Ok(Self {
            config,
            proxies,
            monitor,
            incremental,
            scheduler,
        })
    }

    /// Add a proxy to the rotation, returning its slot
    pub async fn add_proxy(&self, proxy: ProxyInfo) -> usize {
        self.proxies.lock().await.add_proxy(proxy)
    }

    pub async fn blacklist_proxy(&self, slot: usize) {
        self.proxies.lock().await.blacklist_proxy(slot);
    }

    pub async fn reactivate_proxy(&self, slot: usize) -> bool {
        self.proxies.lock().await.reactivate_proxy(slot)
    }

    pub async fn proxy_stats(&self) -> Vec<ProxyStats> {
        self.proxies.lock().await.get_proxy_stats()
    }

    /// Skip URLs crawled within the configured staleness window, persisting
    /// crawl times to `storage`
    pub async fn setup_incremental_crawling(&self, storage: Arc<dyn CrawlStateStore>) {
        let staleness = self.config.incremental.staleness();
        *self.incremental.write().await = Some(Arc::new(IncrementalCrawler::new(storage, staleness)));
        info!("Incremental crawling enabled with staleness {:?}", staleness);
    }

    pub async fn incremental(&self) -> Option<Arc<IncrementalCrawler>> {
        self.incremental.read().await.clone()
    }

    /// Queue `url` for crawling.
    ///
    /// Returns the new task id, or `None` when the incremental filter decided
    /// the URL was crawled recently enough.
    pub async fn add_task(&self, url: &str, config: Value, priority: TaskPriority) -> Option<String> {
        let task = CrawlTask::new(url, config, priority)
            .with_max_retries(self.config.scheduler.max_retries);
        self.submit(task).await.ok().flatten()
    }

    /// Queue a task with a caller-assigned id
    pub async fn submit(&self, task: CrawlTask) -> CrawlResult<Option<String>> {
        if let Some(incremental) = self.incremental().await {
            if !incremental.should_crawl(&task.url).await {
                debug!("Not queueing {}: crawled recently", task.url);
                return Ok(None);
            }
        }

        let id = task.id.clone();
        if !self.scheduler.add_task(task).await {
            return Err(CrawlError::DuplicateTask(id));
        }
        Ok(Some(id))
    }

    pub async fn start(&self) {
        self.scheduler.start().await;
    }

    pub async fn pause(&self) {
        self.scheduler.pause().await;
    }

    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }

    pub async fn get_task(&self, id: &str) -> Option<CrawlTask> {
        self.scheduler.get_task(id).await
    }

    pub async fn tasks(&self) -> Vec<CrawlTask> {
        self.scheduler.tasks().await
    }

    pub async fn retry_task(&self, id: &str) -> bool {
        self.scheduler.retry_task(id).await
    }

    pub async fn cancel_task(&self, id: &str) -> bool {
        self.scheduler.cancel_task(id).await
    }

    pub async fn clear_completed_tasks(&self) -> usize {
        self.scheduler.clear_completed_tasks().await
    }

    pub async fn get_status(&self) -> CrawlerStatus {
        let (active_proxies, proxy_count) = {
            let pool = self.proxies.lock().await;
            (pool.active_count(), pool.len())
        };
        let counts = self.scheduler.counts().await;

        CrawlerStatus {
            active_proxies,
            proxy_count,
            active_tasks: counts.active,
            queued_tasks: counts.queued,
            running_tasks: counts.running,
            metrics: self.monitor.get_metrics().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ClientIdentity;
    use crate::crawler::task::TaskStatus;
    use crate::storage::MemoryCrawlStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoFetcher;

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(
            &self,
            url: &str,
            config: &Value,
            _proxy: Option<&ProxyInfo>,
            _identity: &ClientIdentity,
        ) -> CrawlResult<Value> {
            Ok(json!({ "url": url, "config": config }))
        }
    }

    fn crawler() -> AdvancedCrawler {
        let mut config = CrawlerConfig::default();
        config.scheduler.domain_delay_ms = 0;
        AdvancedCrawler::new(config, Arc::new(EchoFetcher)).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = CrawlerConfig::default();
        config.proxy.max_failures = 0;
        let err = AdvancedCrawler::new(config, Arc::new(EchoFetcher)).err().unwrap();
        assert!(matches!(err, CrawlError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_fresh_status() {
        let crawler = crawler();
        crawler.add_proxy(ProxyInfo::new("10.0.0.1", 8080)).await;

        let status = crawler.get_status().await;
        assert_eq!(status.proxy_count, 1);
        assert_eq!(status.active_proxies, 1);
        assert_eq!(status.active_tasks, 0);
        assert_eq!(status.metrics.total_requests, 0);
        assert_eq!(status.metrics.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_config_passed_through_unmodified() {
        let crawler = crawler();
        crawler.start().await;

        let config = json!({ "selectors": { "title": "h1" }, "depth": 2 });
        let id = crawler.add_task("https://example.com", config.clone(), TaskPriority::Normal).await.unwrap();
        crawler.wait_idle().await;

        let task = crawler.get_task(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.config, config);
        assert_eq!(task.result.unwrap()["config"], config);
    }

    #[tokio::test]
    async fn test_duplicate_submit_is_an_error() {
        let crawler = crawler();
        let task = CrawlTask::with_id("fixed", "https://example.com", Value::Null, TaskPriority::Low);

        assert_eq!(crawler.submit(task.clone()).await.unwrap(), Some("fixed".to_string()));
        assert!(matches!(crawler.submit(task).await, Err(CrawlError::DuplicateTask(_))));
    }

    #[tokio::test]
    async fn test_incremental_skip_returns_none() {
        let crawler = crawler();
        crawler.setup_incremental_crawling(Arc::new(MemoryCrawlStore::new())).await;
        crawler.start().await;

        let first = crawler.add_task("https://example.com", Value::Null, TaskPriority::Normal).await;
        assert!(first.is_some());
        crawler.wait_idle().await;

        let task = crawler.get_task(&first.unwrap()).await.unwrap();
        assert_eq!(task.content_changed, Some(true));
        assert!(crawler.add_task("https://example.com", Value::Null, TaskPriority::Normal).await.is_none());
        assert_eq!(crawler.tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_proxy_blacklist_and_reactivate() {
        let crawler = crawler();
        let slot = crawler.add_proxy(ProxyInfo::new("10.0.0.1", 8080)).await;

        crawler.blacklist_proxy(slot).await;
        assert_eq!(crawler.get_status().await.active_proxies, 0);

        assert!(crawler.reactivate_proxy(slot).await);
        let stats = crawler.proxy_stats().await;
        assert!(stats[0].is_active);
    }
}
