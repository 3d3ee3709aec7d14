use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// Dispatch priority; later variants win
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A URL scheduled for fetching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    /// Unique identifier, caller supplied or a UUID
    pub id: String,

    /// URL to crawl
    pub url: String,

    /// Caller-owned fetch options, passed to the fetch engine untouched
    pub config: Value,

    pub priority: TaskPriority,
    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Number of explicit re-attempts made so far
    pub retry_count: u32,
    pub max_retries: u32,

    pub error: Option<String>,

    /// Payload returned by the fetch engine
    pub result: Option<Value>,

    /// Whether the payload differs from the previous crawl (incremental mode only)
    pub content_changed: Option<bool>,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskPriority::Low => "low",
            TaskPriority::Normal => "normal",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        };
        f.write_str(name)
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

impl CrawlTask {
    /// Create a pending task with a generated id
    pub fn new(url: impl Into<String>, config: Value, priority: TaskPriority) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), url, config, priority)
    }

    /// Create a pending task with a caller-assigned id
    pub fn with_id(id: impl Into<String>, url: impl Into<String>, config: Value, priority: TaskPriority) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            config,
            priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            retry_count: 0,
            max_retries: 3,
            error: None,
            result: None,
            content_changed: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&mut self, result: Value) {
        self.status = TaskStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
        self.error = None;
    }

    pub(crate) fn mark_failed(&mut self, error: String) {
        self.status = TaskStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// Reset a failed task for another attempt under the same id
    pub(crate) fn prepare_retry(&mut self) {
        self.retry_count += 1;
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.finished_at = None;
    }
}
