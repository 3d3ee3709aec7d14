pub mod manager;

// Re-export common types
pub use manager::{ProxyInfo, ProxyLease, ProxyPool, ProxyStats};
