use std::collections::HashMap;
use std::time::Duration;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use serde::{Serialize, Deserialize};
use tracing::debug;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

const VIEWPORTS: &[Viewport] = &[
    Viewport { width: 1920, height: 1080 },
    Viewport { width: 1366, height: 768 },
    Viewport { width: 1440, height: 900 },
    Viewport { width: 1536, height: 864 },
];

const REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://www.yahoo.com/",
    "https://duckduckgo.com/",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-US,en;q=0.5",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.8,de;q=0.6",
];

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Client identity presented for a single request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub viewport: Viewport,
    pub headers: HashMap<String, String>,
}

/// Randomized request attributes drawn from fixed candidate pools
#[derive(Debug, Clone, Default)]
pub struct AntiDetectionManager;

impl AntiDetectionManager {
    pub fn new() -> Self {
        Self
    }

    pub fn user_agents(&self) -> &'static [&'static str] {
        USER_AGENTS
    }

    pub fn viewports(&self) -> &'static [Viewport] {
        VIEWPORTS
    }

    pub fn get_random_user_agent(&self) -> String {
        pick(USER_AGENTS).to_string()
    }

    pub fn get_random_viewport(&self) -> Viewport {
        *pick(VIEWPORTS)
    }

    pub fn get_random_referer(&self) -> String {
        pick(REFERERS).to_string()
    }

    /// Plausible browser headers around a freshly drawn user agent
    pub fn get_random_headers(&self) -> HashMap<String, String> {
        self.headers_for(&self.get_random_user_agent())
    }

    /// Random pause to put between requests
    pub fn random_delay(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        thread_rng().gen_range(min..=max)
    }

    /// Draw a complete identity whose headers agree with its user agent
    pub fn random_identity(&self) -> ClientIdentity {
        let user_agent = self.get_random_user_agent();
        let headers = self.headers_for(&user_agent);
        let identity = ClientIdentity {
            user_agent,
            viewport: self.get_random_viewport(),
            headers,
        };

        debug!(
            "Generated identity: {}x{} {}",
            identity.viewport.width, identity.viewport.height, identity.user_agent
        );

        identity
    }

    fn headers_for(&self, user_agent: &str) -> HashMap<String, String> {
        let mut rng = thread_rng();
        let mut headers = HashMap::new();

        headers.insert("User-Agent".to_string(), user_agent.to_string());
        headers.insert("Accept".to_string(), ACCEPT.to_string());
        headers.insert("Accept-Language".to_string(), pick(ACCEPT_LANGUAGES).to_string());
        headers.insert("Accept-Encoding".to_string(), "gzip, deflate, br".to_string());
        headers.insert("Connection".to_string(), "keep-alive".to_string());
        headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());

        if rng.gen_bool(0.5) {
            headers.insert("DNT".to_string(), "1".to_string());
        }
        if rng.gen_bool(0.7) {
            headers.insert("Referer".to_string(), self.get_random_referer());
        }

        headers
    }
}

fn pick<T>(candidates: &'static [T]) -> &'static T {
    // Tables are non-empty constants
    candidates.choose(&mut thread_rng()).unwrap_or(&candidates[0])
}
