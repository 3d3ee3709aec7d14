pub mod redis_store;
pub mod state;

// Re-export common types
pub use redis_store::RedisCrawlStore;
pub use state::{CrawlStateStore, MemoryCrawlStore};
