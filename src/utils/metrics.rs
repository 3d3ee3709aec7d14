use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::cli::config::MonitorSettings;

/// Operational counters for the crawl, shared by every worker
#[derive(Debug, Clone)]
pub struct CrawlMonitor {
    /// In-memory metrics store
    metrics: Arc<Mutex<Metrics>>,

    /// Alert thresholds
    settings: Arc<MonitorSettings>,
}

/// Conditions worth shouting about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowSuccessRate,
    HighBlockRate,
    SlowResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub start_time: DateTime<Utc>,
    pub uptime_secs: f64,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,

    /// Failures the target answered with a block; counted in failed_requests too
    pub blocked_requests: usize,
    pub success_rate: f64,

    /// Mean request duration in seconds
    pub average_response_time: f64,
    pub requests_per_minute: f64,
    pub recent_alerts: Vec<Alert>,
}

#[derive(Debug)]
struct Metrics {
    start_time: DateTime<Utc>,
    started: Instant,
    total_requests: usize,
    successful_requests: usize,
    failed_requests: usize,
    blocked_requests: usize,
    total_response_time: Duration,
    alerts: VecDeque<Alert>,

    /// Alerts currently raised; an alert fires again only after it clears
    raised: HashSet<AlertKind>,
}

impl Metrics {
    fn new() -> Self {
        Self {
            start_time: Utc::now(),
            started: Instant::now(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            blocked_requests: 0,
            total_response_time: Duration::ZERO,
            alerts: VecDeque::new(),
            raised: HashSet::new(),
        }
    }

    fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    fn average_response_time(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_response_time.as_secs_f64() / self.total_requests as f64
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.started.elapsed().as_secs_f64();
        let elapsed_minutes = (uptime / 60.0).max(1.0);

        MetricsSnapshot {
            start_time: self.start_time,
            uptime_secs: uptime,
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            blocked_requests: self.blocked_requests,
            success_rate: self.success_rate(),
            average_response_time: self.average_response_time(),
            requests_per_minute: self.total_requests as f64 / elapsed_minutes,
            recent_alerts: self.alerts.iter().rev().take(10).rev().cloned().collect(),
        }
    }
}

impl Default for CrawlMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::default())
    }
}

impl CrawlMonitor {
    /// Create a new monitor with the given alert thresholds
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            metrics: Arc::new(Mutex::new(Metrics::new())),
            settings: Arc::new(settings),
        }
    }

    /// Record the outcome of one request
    pub async fn record_request(&self, success: bool, duration: Duration) {
        let mut metrics = self.metrics.lock().await;

        metrics.total_requests += 1;
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }
        metrics.total_response_time += duration;

        self.check_alerts(&mut metrics);
    }

    /// Record a request the target refused (captcha wall, 403, 429)
    pub async fn record_blocked(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;

        metrics.total_requests += 1;
        metrics.failed_requests += 1;
        metrics.blocked_requests += 1;
        metrics.total_response_time += duration;

        self.check_alerts(&mut metrics);
    }

    /// Start timing a request
    pub fn start_timer(&self) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
        }
    }

    /// Get a consistent snapshot of all counters
    pub async fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.lock().await.snapshot()
    }

    /// Reset metrics
    pub async fn reset(&self) {
        let mut metrics = self.metrics.lock().await;
        *metrics = Metrics::new();
    }

    fn check_alerts(&self, metrics: &mut Metrics) {
        let settings = &self.settings;

        let success_rate = metrics.success_rate();
        let low_success = metrics.total_requests >= settings.alert_min_requests
            && success_rate < settings.min_success_rate;
        self.update_alert(
            metrics,
            AlertKind::LowSuccessRate,
            low_success,
            format!("Success rate is {:.2}%", success_rate * 100.0),
        );

        let blocked = metrics.blocked_requests;
        self.update_alert(
            metrics,
            AlertKind::HighBlockRate,
            blocked > settings.max_blocked_requests,
            format!("Blocked requests: {}", blocked),
        );

        let average = metrics.average_response_time();
        self.update_alert(
            metrics,
            AlertKind::SlowResponse,
            average > settings.max_average_response_secs,
            format!("Average response time: {:.2}s", average),
        );
    }

    fn update_alert(&self, metrics: &mut Metrics, kind: AlertKind, active: bool, message: String) {
        if !active {
            metrics.raised.remove(&kind);
            return;
        }
        if !metrics.raised.insert(kind) {
            return;
        }

        warn!("ALERT [{:?}]: {}", kind, message);
        metrics.alerts.push_back(Alert {
            kind,
            message,
            timestamp: Utc::now(),
        });
        while metrics.alerts.len() > self.settings.alert_history.max(1) {
            metrics.alerts.pop_front();
        }
    }
}

/// Request timer for measuring request durations
pub struct RequestTimer {
    /// Start time of the request
    start: Instant,
}

impl RequestTimer {
    /// End timing and get the elapsed duration
    pub fn end(&self) -> Duration {
        self.start.elapsed()
    }
}
