use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::browser::AntiDetectionManager;
use crate::cli::config::SchedulerSettings;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::incremental::IncrementalCrawler;
use crate::crawler::task::{CrawlTask, TaskPriority, TaskStatus};
use crate::error::{CrawlError, CrawlResult};
use crate::proxy::ProxyPool;
use crate::utils::CrawlMonitor;

/// Shared resources a dispatched task draws on, owned by the orchestrator
pub struct DispatchContext {
    pub proxies: Arc<Mutex<ProxyPool>>,
    pub anti_detection: Arc<AntiDetectionManager>,
    pub monitor: CrawlMonitor,
    pub incremental: Arc<RwLock<Option<Arc<IncrementalCrawler>>>>,
    pub fetcher: Arc<dyn Fetcher>,
}

/// Task counts at one instant
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SchedulerCounts {
    pub queued: usize,
    pub running: usize,

    /// Tasks not yet in a terminal state
    pub active: usize,
    pub finished: usize,

    /// Highest number of simultaneously running tasks observed
    pub peak_running: usize,
}

/// Priority-ordered dispatcher with a hard concurrency ceiling
#[derive(Clone)]
pub struct TaskScheduler {
    state: Arc<Mutex<SchedulerState>>,
    ctx: Arc<DispatchContext>,
    settings: Arc<SchedulerSettings>,
    idle: Arc<Notify>,
}

struct SchedulerState {
    /// Every task ever admitted, pending through terminal
    tasks: HashMap<String, CrawlTask>,

    /// Pending task ids, highest priority first, FIFO within a tier
    task_queue: BinaryHeap<QueuedTask>,

    running: usize,
    peak_running: usize,
    next_seq: u64,

    /// Whether new tasks may be dispatched
    dispatching: bool,

    /// Earliest next dispatch per host; hosts whose time has passed are dropped
    domain_slots: HashMap<String, Instant>,

    /// Pending wake-up for tasks held back by a host's politeness gap
    wakeup_at: Option<Instant>,
}

#[derive(Debug, PartialEq, Eq)]
struct QueuedTask {
    priority: TaskPriority,
    seq: u64,
    id: String,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then the earlier submission
        self.priority.cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of one dispatch, before bookkeeping
struct Attempt {
    proxy_slot: Option<usize>,
    duration: Duration,

    /// False when the task failed before any request went out
    fetched: bool,
    result: CrawlResult<Value>,
}

impl SchedulerState {
    fn enqueue(&mut self, id: String, priority: TaskPriority) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.task_queue.push(QueuedTask { priority, seq, id });
    }

    fn counts(&self) -> SchedulerCounts {
        let mut counts = SchedulerCounts {
            running: self.running,
            peak_running: self.peak_running,
            ..SchedulerCounts::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.queued += 1,
                TaskStatus::Running => {}
                _ => counts.finished += 1,
            }
        }
        counts.active = counts.queued + self.running;
        counts
    }

    fn is_idle(&self) -> bool {
        self.running == 0 && (!self.dispatching || self.counts().queued == 0)
    }

    /// When `host` may next be dispatched to, if it is still cooling down
    fn host_ready_at(&self, host: &str, now: Instant) -> Option<Instant> {
        self.domain_slots.get(host).copied().filter(|next| *next > now)
    }

    fn reserve_host(&mut self, host: String, now: Instant, delay: Duration) {
        self.domain_slots.retain(|_, next| *next > now);
        self.domain_slots.insert(host, now + delay);
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

impl TaskScheduler {
    /// Create a scheduler; dispatch begins once `start` is called
    pub fn new(settings: SchedulerSettings, ctx: DispatchContext) -> CrawlResult<Self> {
        if settings.max_concurrent == 0 {
            return Err(CrawlError::InvalidConfig("max_concurrent must be at least 1".to_string()));
        }

        Ok(Self {
            state: Arc::new(Mutex::new(SchedulerState {
                tasks: HashMap::new(),
                task_queue: BinaryHeap::new(),
                running: 0,
                peak_running: 0,
                next_seq: 0,
                dispatching: false,
                domain_slots: HashMap::new(),
                wakeup_at: None,
            })),
            ctx: Arc::new(ctx),
            settings: Arc::new(settings),
            idle: Arc::new(Notify::new()),
        })
    }

    /// Admit a task; a task whose id is already known is rejected untouched
    pub async fn add_task(&self, mut task: CrawlTask) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.tasks.contains_key(&task.id) {
                warn!("Rejected duplicate task id: {}", task.id);
                return false;
            }

            task.status = TaskStatus::Pending;
            info!("Added task {} with priority {}", task.id, task.priority);
            state.enqueue(task.id.clone(), task.priority);
            state.tasks.insert(task.id.clone(), task);
        }

        self.dispatch().await;
        true
    }

    /// Allow dispatch and fill every free slot
    pub async fn start(&self) {
        self.state.lock().await.dispatching = true;
        info!("Scheduler started with {} slots", self.settings.max_concurrent);
        self.dispatch().await;
    }

    /// Stop dispatching new tasks; running tasks finish normally
    pub async fn pause(&self) {
        let mut state = self.state.lock().await;
        state.dispatching = false;
        info!("Scheduler paused with {} tasks running", state.running);
        self.notify_if_idle(&state);
    }

    /// Wait until nothing is running and nothing dispatchable is queued
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.state.lock().await.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub async fn get_task(&self, id: &str) -> Option<CrawlTask> {
        self.state.lock().await.tasks.get(id).cloned()
    }

    pub async fn tasks(&self) -> Vec<CrawlTask> {
        self.state.lock().await.tasks.values().cloned().collect()
    }

    pub async fn counts(&self) -> SchedulerCounts {
        self.state.lock().await.counts()
    }

    /// Re-enqueue a failed task under the same id, if it has attempts left
    pub async fn retry_task(&self, id: &str) -> bool {
        {
            let mut state = self.state.lock().await;
            let Some(task) = state.tasks.get_mut(id) else {
                return false;
            };
            if task.status != TaskStatus::Failed || task.retry_count >= task.max_retries {
                return false;
            }

            task.prepare_retry();
            let priority = task.priority;
            info!("Retrying task {} ({}/{})", id, task.retry_count, task.max_retries);
            state.enqueue(id.to_string(), priority);
        }

        self.dispatch().await;
        true
    }

    /// Withdraw a task that has not been dispatched yet
    pub async fn cancel_task(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.mark_cancelled();
                info!("Cancelled task {}", id);
                self.notify_if_idle(&state);
                true
            }
            _ => false,
        }
    }

    /// Forget terminal tasks, returning how many were dropped
    pub async fn clear_completed_tasks(&self) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let before = state.tasks.len();
        state.tasks.retain(|_, task| !task.status.is_terminal());

        let tasks = &state.tasks;
        let queue = std::mem::take(&mut state.task_queue);
        state.task_queue = queue.into_iter()
            .filter(|entry| tasks.get(&entry.id).map_or(false, |t| t.status == TaskStatus::Pending))
            .collect();

        before - state.tasks.len()
    }

    /// Fill free slots from the queue.
    ///
    /// Tasks whose host is still inside its politeness gap stay queued without
    /// taking a slot, so lower-priority work for other hosts can go first.
    async fn dispatch(&self) {
        let (launched, wakeup) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let mut launched = Vec::new();
            let mut held_back = Vec::new();
            let mut earliest: Option<Instant> = None;

            if !state.dispatching {
                return;
            }

            let delay = self.settings.domain_delay();
            let now = Instant::now();

            while state.running < self.settings.max_concurrent {
                let Some(entry) = state.task_queue.pop() else {
                    break;
                };
                let Some(task) = state.tasks.get(&entry.id) else {
                    continue;
                };
                if task.status != TaskStatus::Pending {
                    // Cancelled while queued
                    continue;
                }

                let host = if delay.is_zero() { None } else { host_of(&task.url) };
                if let Some(host) = host {
                    if let Some(ready_at) = state.host_ready_at(&host, now) {
                        earliest = Some(earliest.map_or(ready_at, |e| e.min(ready_at)));
                        held_back.push(entry);
                        continue;
                    }
                    state.reserve_host(host, now, delay);
                }

                let Some(task) = state.tasks.get_mut(&entry.id) else {
                    continue;
                };
                task.mark_running();
                debug!("Dispatching task {} ({})", task.id, task.url);
                launched.push((task.id.clone(), task.url.clone(), task.config.clone()));

                state.running += 1;
                state.peak_running = state.peak_running.max(state.running);
            }

            state.task_queue.extend(held_back);

            let wakeup = earliest.filter(|at| state.wakeup_at.map_or(true, |pending| *at < pending));
            if wakeup.is_some() {
                state.wakeup_at = wakeup;
            }

            (launched, wakeup)
        };

        for (id, url, config) in launched {
            tokio::spawn(self.clone().run_task(id, url, config));
        }
        if let Some(at) = wakeup {
            tokio::spawn(self.clone().wake_at(at));
        }
    }

    // Boxed for the same reason as `run_task`
    fn wake_at(self, at: Instant) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tokio::time::sleep_until(at).await;
            {
                let mut state = self.state.lock().await;
                if state.wakeup_at == Some(at) {
                    state.wakeup_at = None;
                }
            }
            self.dispatch().await;
        })
    }

    // Boxed so the dispatch -> run_task -> dispatch chain has a nameable type
    fn run_task(self, id: String, url: String, config: Value) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let attempt = self.execute(&url, config).await;
            self.finish(&id, &url, attempt).await;
            self.dispatch().await;
        })
    }

    async fn execute(&self, url: &str, config: Value) -> Attempt {
        // An empty pool means proxying is not configured: connect directly
        let lease = {
            let mut pool = self.ctx.proxies.lock().await;
            if pool.is_empty() {
                None
            } else {
                match pool.get_next_proxy() {
                    Some(lease) => Some(lease),
                    None => {
                        return Attempt {
                            proxy_slot: None,
                            duration: Duration::ZERO,
                            fetched: false,
                            result: Err(CrawlError::NoProxyAvailable),
                        };
                    }
                }
            }
        };

        let identity = self.ctx.anti_detection.random_identity();

        let (jitter_min, jitter_max) = self.settings.jitter_ms;
        if jitter_max > 0 {
            let delay = self.ctx.anti_detection.random_delay(
                Duration::from_millis(jitter_min),
                Duration::from_millis(jitter_max),
            );
            tokio::time::sleep(delay).await;
        }

        let proxy_slot = lease.as_ref().map(|lease| lease.slot);
        let proxy = lease.map(|lease| lease.proxy);
        let fetcher = self.ctx.fetcher.clone();
        let target = url.to_string();

        let timer = self.ctx.monitor.start_timer();

        // The fetch runs as its own task so a panic or a hang cannot leak the slot
        let mut handle = tokio::spawn(async move {
            fetcher.fetch(&target, &config, proxy.as_ref(), &identity).await
        });
        let deadline = self.settings.task_timeout();
        let result = match timeout(deadline, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(CrawlError::Fetch(format!("fetch task aborted: {}", join_error))),
            Err(_) => {
                handle.abort();
                Err(CrawlError::Timeout(deadline))
            }
        };

        Attempt {
            proxy_slot,
            duration: timer.end(),
            fetched: true,
            result,
        }
    }

    async fn finish(&self, id: &str, url: &str, attempt: Attempt) {
        let Attempt { proxy_slot, duration, fetched, result } = attempt;
        let mut content_changed = None;

        match &result {
            Ok(payload) => {
                if let Some(slot) = proxy_slot {
                    self.ctx.proxies.lock().await.record_success(slot, duration);
                }
                self.ctx.monitor.record_request(true, duration).await;

                let incremental = self.ctx.incremental.read().await.clone();
                if let Some(incremental) = incremental {
                    if let Err(e) = incremental.mark_crawled(url).await {
                        warn!("Failed to persist crawl time for {}: {}", url, e);
                    }
                    content_changed = Some(incremental.is_content_changed(url, &payload.to_string()).await);
                }
            }
            Err(e) if fetched => {
                if let Some(slot) = proxy_slot {
                    self.ctx.proxies.lock().await.record_failure(slot, duration);
                }
                if e.is_blocked() {
                    self.ctx.monitor.record_blocked(duration).await;
                } else {
                    self.ctx.monitor.record_request(false, duration).await;
                }
            }
            Err(_) => {}
        }

        let mut state = self.state.lock().await;
        if let Some(task) = state.tasks.get_mut(id) {
            match result {
                Ok(payload) => {
                    task.mark_completed(payload);
                    task.content_changed = content_changed;
                    info!("Task {} completed successfully in {:?}", id, duration);
                }
                Err(e) => {
                    error!("Task {} failed: {}", id, e);
                    task.mark_failed(e.to_string());
                }
            }
        }
        state.running -= 1;
        self.notify_if_idle(&state);
    }

    fn notify_if_idle(&self, state: &SchedulerState) {
        if state.is_idle() {
            self.idle.notify_waiters();
        }
    }
}
