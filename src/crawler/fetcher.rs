use async_trait::async_trait;
use serde_json::Value;

use crate::browser::ClientIdentity;
use crate::error::CrawlResult;
use crate::proxy::ProxyInfo;

/// Page-fetching engine driven by the scheduler
///
/// Implementations perform the actual network or browser work. The scheduler
/// measures the duration and wraps every call in its own deadline, so a
/// fetch that never returns only costs the task, not the slot.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` through `proxy` (direct when `None`) presenting `identity`
    ///
    /// `config` is the caller's opaque task configuration. The returned value
    /// is stored on the task as its result.
    async fn fetch(
        &self,
        url: &str,
        config: &Value,
        proxy: Option<&ProxyInfo>,
        identity: &ClientIdentity,
    ) -> CrawlResult<Value>;
}
