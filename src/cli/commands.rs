use anyhow::{Result, Context};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::browser::{HttpFetcher, RemoteBrowserService};
use crate::cli::config::CrawlerConfig;
use crate::crawler::{AdvancedCrawler, Fetcher, TaskPriority};
use crate::storage::{CrawlStateStore, MemoryCrawlStore, RedisCrawlStore};

/// Flags of the `crawl` command
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    pub priority: TaskPriority,
    pub concurrency: Option<usize>,
    pub config: Option<PathBuf>,
    pub redis: Option<String>,
    pub remote: bool,
}

/// Resolve the configuration and apply command line overrides
pub fn resolve_config(options: &CrawlOptions) -> Result<CrawlerConfig> {
    let mut config = match &options.config {
        Some(path) => CrawlerConfig::load_from_file(path)?,
        None => CrawlerConfig::load_default()?,
    };

    if let Some(concurrency) = options.concurrency {
        config.scheduler.max_concurrent = concurrency;
    }
    if options.remote {
        config.fetcher.engine = "remote".to_string();
    }
    if let Some(redis_url) = &options.redis {
        config.incremental.enabled = true;
        config.incremental.redis_url = Some(redis_url.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Fetch engine selected by the configuration
pub fn build_fetcher(config: &CrawlerConfig) -> Result<Arc<dyn Fetcher>> {
    let timeout = config.fetcher.request_timeout();
    let fetcher: Arc<dyn Fetcher> = match config.fetcher.engine.as_str() {
        "remote" => Arc::new(RemoteBrowserService::from_env(
            &config.fetcher.browser_service_url,
            &config.fetcher.browser_type,
            timeout,
        ).context("Failed to create browser service client")?),
        _ => Arc::new(HttpFetcher::new(timeout)),
    };
    Ok(fetcher)
}

async fn build_state_store(config: &CrawlerConfig) -> Result<Arc<dyn CrawlStateStore>> {
    match &config.incremental.redis_url {
        Some(redis_url) => {
            let store = RedisCrawlStore::connect(redis_url)
                .await
                .context(format!("Failed to connect to Redis at {}", redis_url))?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("No Redis URL configured; crawl times will not outlive this run");
            Ok(Arc::new(MemoryCrawlStore::new()))
        }
    }
}

/// Crawl `urls` to completion and print the final status as JSON
pub async fn crawl(urls: Vec<String>, options: CrawlOptions) -> Result<()> {
    let config = resolve_config(&options)?;
    let fetcher = build_fetcher(&config)?;
    let incremental = config.incremental.enabled;

    let store = if incremental {
        Some(build_state_store(&config).await?)
    } else {
        None
    };

    let crawler = AdvancedCrawler::new(config, fetcher)?;
    if let Some(store) = store {
        crawler.setup_incremental_crawling(store).await;
    }

    crawler.start().await;

    let mut queued = 0;
    for url in &urls {
        match crawler.add_task(url, Value::Null, options.priority).await {
            Some(id) => {
                info!("Queued {} as task {}", url, id);
                queued += 1;
            }
            None => info!("Skipped {}: crawled recently", url),
        }
    }
    info!("Queued {} of {} URLs", queued, urls.len());

    crawler.wait_idle().await;

    let status = crawler.get_status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    Ok(())
}

/// Print the default configuration as YAML
pub async fn show_config() -> Result<()> {
    let config = CrawlerConfig::load_default()?;

    println!("Configuration file: {}", CrawlerConfig::default_path().display());
    println!("{}", serde_yaml::to_string(&config)?);

    Ok(())
}

/// Write the built-in defaults to the default configuration path
pub async fn init_config() -> Result<()> {
    let path = CrawlerConfig::default_path();
    if path.exists() {
        warn!("Overwriting existing configuration at {}", path.display());
    }

    CrawlerConfig::default().save_to_file(&path)?;
    println!("Wrote default configuration to {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(yaml: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("crawl-orchestrator-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn test_overrides_applied() {
        let path = write_config("scheduler:\n  max_concurrent: 8\n");
        let options = CrawlOptions {
            concurrency: Some(2),
            config: Some(path.clone()),
            redis: Some("redis://127.0.0.1/".to_string()),
            remote: true,
            ..CrawlOptions::default()
        };

        let config = resolve_config(&options).unwrap();
        assert_eq!(config.scheduler.max_concurrent, 2);
        assert_eq!(config.fetcher.engine, "remote");
        assert!(config.incremental.enabled);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_zero_concurrency_override_rejected() {
        let path = write_config("{}\n");
        let options = CrawlOptions {
            concurrency: Some(0),
            config: Some(path.clone()),
            ..CrawlOptions::default()
        };

        assert!(resolve_config(&options).is_err());
        std::fs::remove_file(path).unwrap();
    }
}
