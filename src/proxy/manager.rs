use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cli::config::ProxySettings;

/// One egress proxy and its health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyInfo {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub protocol: String,
    pub is_active: bool,

    /// Consecutive failures since the last successful use
    pub failure_count: u32,
    pub success_count: u32,
    pub last_used: Option<DateTime<Utc>>,

    /// Rolling health score in 0.0..=1.0
    pub success_rate: f64,

    /// Sum of observed response times in seconds
    pub total_response_time: f64,
}

/// Proxy handed out by the pool, addressed by its slot in the rotation list
#[derive(Debug, Clone)]
pub struct ProxyLease {
    pub slot: usize,
    pub proxy: ProxyInfo,
}

/// Per-proxy summary for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStats {
    pub slot: usize,
    pub host: String,
    pub port: u16,
    pub is_active: bool,
    pub success_count: u32,
    pub failure_count: u32,
    pub success_rate: f64,
    pub average_response_time: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ProxyInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            protocol: "http".to_string(),
            is_active: true,
            failure_count: 0,
            success_count: 0,
            last_used: None,
            success_rate: 1.0,
            total_response_time: 0.0,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Build the proxy URL understood by HTTP clients
    pub fn url(&self) -> String {
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            format!("{}://{}:{}@{}:{}", self.protocol, username, password, self.host, self.port)
        } else {
            format!("{}://{}:{}", self.protocol, self.host, self.port)
        }
    }

    /// Host and port, without credentials, for logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Round-robin pool of egress proxies with failure-driven eviction
#[derive(Debug)]
pub struct ProxyPool {
    /// All proxies ever added, including blacklisted ones
    proxies: Vec<ProxyInfo>,

    /// Uses recorded per slot; failure_count resets on success so it cannot
    /// serve as the latency denominator
    samples: Vec<u32>,

    /// Next slot to consider
    cursor: usize,

    max_failures: u32,
    min_success_rate: f64,
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new(&ProxySettings::default())
    }
}

impl ProxyPool {
    /// Create an empty pool with the given eviction settings
    pub fn new(config: &ProxySettings) -> Self {
        Self {
            proxies: Vec::new(),
            samples: Vec::new(),
            cursor: 0,
            max_failures: config.max_failures,
            min_success_rate: config.min_success_rate,
        }
    }

    /// Create a pool pre-filled with the configured proxy list
    pub fn from_settings(config: &ProxySettings) -> Self {
        let mut pool = Self::new(config);
        for proxy in &config.proxy_list {
            pool.add_proxy(proxy.to_proxy_info());
        }
        pool
    }

    /// Append a proxy; duplicates are kept and rotated independently
    pub fn add_proxy(&mut self, mut info: ProxyInfo) -> usize {
        info.is_active = true;
        info!("Added proxy: {}", info.address());
        self.proxies.push(info);
        self.samples.push(0);
        self.proxies.len() - 1
    }

    /// Get the next active proxy, cycling over the full list
    pub fn get_next_proxy(&mut self) -> Option<ProxyLease> {
        let len = self.proxies.len();
        if len == 0 {
            return None;
        }

        for offset in 0..len {
            let slot = (self.cursor + offset) % len;
            if self.proxies[slot].is_active {
                self.cursor = (slot + 1) % len;
                let proxy = &mut self.proxies[slot];
                proxy.last_used = Some(Utc::now());
                debug!("Rotated to proxy: {}", proxy.address());
                return Some(ProxyLease { slot, proxy: proxy.clone() });
            }
        }

        warn!("No active proxies available");
        None
    }

    /// Take a proxy out of rotation; the entry stays visible for diagnostics
    pub fn blacklist_proxy(&mut self, slot: usize) {
        if let Some(proxy) = self.proxies.get_mut(slot) {
            if proxy.is_active {
                proxy.is_active = false;
                warn!("Blacklisted proxy: {}", proxy.address());
            }
        }
    }

    /// Put a blacklisted proxy back into rotation with a clean record
    pub fn reactivate_proxy(&mut self, slot: usize) -> bool {
        match self.proxies.get_mut(slot) {
            Some(proxy) if !proxy.is_active => {
                proxy.is_active = true;
                proxy.failure_count = 0;
                proxy.success_rate = 1.0;
                info!("Reactivated proxy: {}", proxy.address());
                true
            }
            _ => false,
        }
    }

    /// Report a successful use of a proxy
    pub fn record_success(&mut self, slot: usize, response_time: Duration) {
        let Some(proxy) = self.proxies.get_mut(slot) else {
            return;
        };
        proxy.failure_count = 0;
        proxy.success_count += 1;
        proxy.success_rate = (proxy.success_rate + 0.1).min(1.0);
        proxy.total_response_time += response_time.as_secs_f64();
        self.samples[slot] += 1;
    }

    /// Report a failed use of a proxy, blacklisting it once it is unhealthy
    pub fn record_failure(&mut self, slot: usize, response_time: Duration) {
        let Some(proxy) = self.proxies.get_mut(slot) else {
            return;
        };
        proxy.failure_count += 1;
        proxy.success_rate = (proxy.success_rate - 0.2).max(0.0);
        proxy.total_response_time += response_time.as_secs_f64();
        self.samples[slot] += 1;

        let exhausted = proxy.failure_count >= self.max_failures;
        let unhealthy = proxy.success_rate < self.min_success_rate;
        debug!(
            "Proxy {} failed ({} consecutive, score {:.2})",
            proxy.address(), proxy.failure_count, proxy.success_rate
        );
        if exhausted || unhealthy {
            self.blacklist_proxy(slot);
        }
    }

    pub fn get(&self, slot: usize) -> Option<&ProxyInfo> {
        self.proxies.get(slot)
    }

    pub fn proxies(&self) -> &[ProxyInfo] {
        &self.proxies
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.proxies.iter().filter(|p| p.is_active).count()
    }

    /// Summaries for every proxy in the pool, blacklisted ones included
    pub fn get_proxy_stats(&self) -> Vec<ProxyStats> {
        self.proxies.iter()
            .zip(&self.samples)
            .enumerate()
            .map(|(slot, (proxy, samples))| ProxyStats {
                slot,
                host: proxy.host.clone(),
                port: proxy.port,
                is_active: proxy.is_active,
                success_count: proxy.success_count,
                failure_count: proxy.failure_count,
                success_rate: proxy.success_rate,
                average_response_time: if *samples == 0 {
                    0.0
                } else {
                    proxy.total_response_time / *samples as f64
                },
                last_used: proxy.last_used,
            })
            .collect()
    }
}
