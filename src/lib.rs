//! Crawl orchestration: proxy rotation, client identity rotation, a
//! priority scheduler with a concurrency ceiling, request monitoring and
//! incremental re-crawl filtering around a pluggable fetch engine.

pub mod browser;
pub mod cli;
pub mod crawler;
pub mod error;
pub mod proxy;
pub mod storage;
pub mod utils;

pub use cli::config::CrawlerConfig;
pub use crawler::{AdvancedCrawler, CrawlTask, CrawlerStatus, Fetcher, TaskPriority, TaskStatus};
pub use error::{CrawlError, CrawlResult};
