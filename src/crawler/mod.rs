pub mod controller;
pub mod fetcher;
pub mod incremental;
pub mod scheduler;
pub mod task;

// Re-export common types
pub use controller::{AdvancedCrawler, CrawlerStatus};
pub use fetcher::Fetcher;
pub use incremental::IncrementalCrawler;
pub use scheduler::{DispatchContext, SchedulerCounts, TaskScheduler};
pub use task::{CrawlTask, TaskPriority, TaskStatus};
