use thiserror::Error;

/// Errors produced by the orchestration core and its collaborators
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("No active proxy available")]
    NoProxyAvailable,

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Request blocked by target: {0}")]
    Blocked(String),

    #[error("Fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task already exists: {0}")]
    DuplicateTask(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CrawlError {
    /// Whether the failure means the target recognised and refused the client
    pub fn is_blocked(&self) -> bool {
        matches!(self, CrawlError::Blocked(_))
    }
}

/// Result type for orchestration operations
pub type CrawlResult<T> = Result<T, CrawlError>;
