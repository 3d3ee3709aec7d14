use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crawl_orchestrator::browser::ClientIdentity;
use crawl_orchestrator::crawler::IncrementalCrawler;
use crawl_orchestrator::proxy::ProxyInfo;
use crawl_orchestrator::storage::{CrawlStateStore, MemoryCrawlStore};
use crawl_orchestrator::{
    AdvancedCrawler, CrawlError, CrawlResult, CrawlTask, CrawlerConfig, Fetcher, TaskPriority, TaskStatus,
};

/// In-process fetch engine that tracks dispatch order and concurrency
#[derive(Default)]
struct SiteFetcher {
    delay: Duration,
    pages: HashMap<String, String>,
    order: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl Fetcher for SiteFetcher {
    async fn fetch(
        &self,
        url: &str,
        _config: &Value,
        _proxy: Option<&ProxyInfo>,
        identity: &ClientIdentity,
    ) -> CrawlResult<Value> {
        self.order.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.pages.get(url) {
            Some(body) => Ok(json!({ "url": url, "content": body, "user_agent": identity.user_agent })),
            None => Err(CrawlError::Fetch(format!("{} answered 404 Not Found", url))),
        }
    }
}

fn config(max_concurrent: usize) -> CrawlerConfig {
    let mut config = CrawlerConfig::default();
    config.scheduler.max_concurrent = max_concurrent;
    config.scheduler.domain_delay_ms = 0;
    config
}

fn site(urls: &[&str]) -> SiteFetcher {
    SiteFetcher {
        pages: urls.iter().map(|url| (url.to_string(), format!("<html>{}</html>", url))).collect(),
        ..SiteFetcher::default()
    }
}

#[tokio::test]
async fn priority_order_with_single_slot() {
    let fetcher = Arc::new(site(&["https://a.example/low", "https://a.example/high", "https://a.example/normal"]));
    let crawler = AdvancedCrawler::new(config(1), fetcher.clone()).unwrap();

    crawler.add_task("https://a.example/low", Value::Null, TaskPriority::Low).await.unwrap();
    crawler.add_task("https://a.example/high", Value::Null, TaskPriority::High).await.unwrap();
    crawler.add_task("https://a.example/normal", Value::Null, TaskPriority::Normal).await.unwrap();

    crawler.start().await;
    crawler.wait_idle().await;

    assert_eq!(*fetcher.order.lock().unwrap(), vec![
        "https://a.example/high",
        "https://a.example/normal",
        "https://a.example/low",
    ]);
}

#[tokio::test]
async fn concurrency_cap_holds_under_concurrent_submission() {
    let urls: Vec<String> = (0..25).map(|i| format!("https://a.example/{}", i)).collect();
    let fetcher = Arc::new(SiteFetcher {
        delay: Duration::from_millis(10),
        ..site(&urls.iter().map(String::as_str).collect::<Vec<_>>())
    });
    let crawler = Arc::new(AdvancedCrawler::new(config(4), fetcher.clone()).unwrap());
    crawler.start().await;

    let submissions = urls.into_iter().map(|url| {
        let crawler = crawler.clone();
        tokio::spawn(async move { crawler.add_task(&url, Value::Null, TaskPriority::Normal).await })
    });
    for submission in futures::future::join_all(submissions).await {
        assert!(submission.unwrap().is_some());
    }
    crawler.wait_idle().await;

    assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 4);
    let status = crawler.get_status().await;
    assert_eq!(status.active_tasks, 0);
    assert_eq!(status.metrics.total_requests, 25);
    assert_eq!(status.metrics.successful_requests, 25);
}

#[tokio::test]
async fn duplicate_id_leaves_original_untouched() {
    let fetcher = Arc::new(site(&["https://a.example/"]));
    let crawler = AdvancedCrawler::new(config(1), fetcher).unwrap();

    let original = CrawlTask::with_id("job-1", "https://a.example/", json!({ "tag": "first" }), TaskPriority::Low);
    let imposter = CrawlTask::with_id("job-1", "https://b.example/", json!({ "tag": "second" }), TaskPriority::Urgent);

    tokio_test::assert_ok!(crawler.submit(original).await);
    tokio_test::assert_err!(crawler.submit(imposter).await);

    let stored = crawler.get_task("job-1").await.unwrap();
    assert_eq!(stored.url, "https://a.example/");
    assert_eq!(stored.priority, TaskPriority::Low);
    assert_eq!(stored.config["tag"], "first");
    assert_eq!(stored.status, TaskStatus::Pending);
}

#[tokio::test]
async fn status_reports_outcomes_and_proxy_health() {
    let fetcher = Arc::new(site(&["https://a.example/ok"]));
    let crawler = AdvancedCrawler::new(config(2), fetcher).unwrap();
    crawler.add_proxy(ProxyInfo::new("10.0.0.1", 3128)).await;
    crawler.add_proxy(ProxyInfo::new("10.0.0.2", 3128)).await;
    crawler.start().await;

    let ok = crawler.add_task("https://a.example/ok", Value::Null, TaskPriority::Normal).await.unwrap();
    let missing = crawler.add_task("https://a.example/missing", Value::Null, TaskPriority::Normal).await.unwrap();
    crawler.wait_idle().await;

    assert_eq!(crawler.get_task(&ok).await.unwrap().status, TaskStatus::Completed);
    let failed = crawler.get_task(&missing).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.unwrap().contains("404"));

    let status = crawler.get_status().await;
    assert_eq!(status.proxy_count, 2);
    assert_eq!(status.active_proxies, 2);
    assert_eq!(status.metrics.total_requests, 2);
    assert_eq!(status.metrics.successful_requests, 1);
    assert_eq!(status.metrics.failed_requests, 1);
    assert_eq!(status.metrics.success_rate, 0.5);

    let used: u32 = crawler.proxy_stats().await.iter().map(|s| s.success_count + s.failure_count).sum();
    assert_eq!(used, 2);
}

#[tokio::test]
async fn incremental_crawling_skips_fresh_urls_across_runs() {
    let store: Arc<dyn CrawlStateStore> = Arc::new(MemoryCrawlStore::new());
    let url = "https://a.example/news";

    let first = AdvancedCrawler::new(config(1), Arc::new(site(&[url]))).unwrap();
    first.setup_incremental_crawling(store.clone()).await;
    first.start().await;
    assert!(first.add_task(url, Value::Null, TaskPriority::Normal).await.is_some());
    first.wait_idle().await;

    // A second orchestrator sharing the store sees the persisted crawl time
    let second = AdvancedCrawler::new(config(1), Arc::new(site(&[url]))).unwrap();
    second.setup_incremental_crawling(store.clone()).await;
    assert!(second.add_task(url, Value::Null, TaskPriority::Normal).await.is_none());
    assert!(second.add_task("https://a.example/other", Value::Null, TaskPriority::Normal).await.is_some());
}

#[tokio::test]
async fn failed_fetch_does_not_mark_url_crawled() {
    let store = Arc::new(MemoryCrawlStore::new());
    let crawler = AdvancedCrawler::new(config(1), Arc::new(site(&[]))).unwrap();
    crawler.setup_incremental_crawling(store.clone()).await;
    crawler.start().await;

    let id = crawler.add_task("https://a.example/gone", Value::Null, TaskPriority::Normal).await.unwrap();
    crawler.wait_idle().await;

    assert_eq!(crawler.get_task(&id).await.unwrap().status, TaskStatus::Failed);
    assert_eq!(store.len().await, 0);
    assert!(crawler.add_task("https://a.example/gone", Value::Null, TaskPriority::Normal).await.is_some());
}

#[test]
fn staleness_threshold_is_honoured() {
    tokio_test::block_on(async {
        let incremental = IncrementalCrawler::new(Arc::new(MemoryCrawlStore::new()), Duration::from_secs(60));
        let url = "https://a.example/";

        assert!(incremental.should_crawl(url).await);
        incremental.mark_crawled(url).await.unwrap();
        assert!(!incremental.should_crawl(url).await);

        incremental.mark_crawled_at(url, chrono::Utc::now() - chrono::Duration::seconds(120)).await.unwrap();
        assert!(incremental.should_crawl(url).await);
    });
}
