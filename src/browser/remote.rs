use async_trait::async_trait;
use reqwest::Client;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::browser::fingerprint::ClientIdentity;
use crate::crawler::Fetcher;
use crate::error::{CrawlError, CrawlResult};
use crate::proxy::ProxyInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserServiceRequest {
    pub url: String,
    pub browser_type: String,
    pub identity: ClientIdentity,
    pub proxy: Option<String>,
    pub config: Value,
    pub take_screenshot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserServiceResponse {
    pub success: bool,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub links: Vec<String>,
    pub screenshot: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub blocked: bool,
}

/// Fetch engine backed by an external browser automation service
pub struct RemoteBrowserService {
    client: Client,
    base_url: String,
    browser_type: String,
}

impl RemoteBrowserService {
    pub fn new(base_url: impl Into<String>, browser_type: impl Into<String>, timeout: Duration) -> CrawlResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            browser_type: browser_type.into(),
        })
    }

    /// Use the service address from `BROWSER_SERVICE_URL` when set
    pub fn from_env(default_url: &str, browser_type: &str, timeout: Duration) -> CrawlResult<Self> {
        let base_url = std::env::var("BROWSER_SERVICE_URL")
            .unwrap_or_else(|_| default_url.to_string());
        Self::new(base_url, browser_type, timeout)
    }
}

#[async_trait]
impl Fetcher for RemoteBrowserService {
    async fn fetch(
        &self,
        url: &str,
        config: &Value,
        proxy: Option<&ProxyInfo>,
        identity: &ClientIdentity,
    ) -> CrawlResult<Value> {
        let endpoint = format!("{}/crawl", self.base_url.trim_end_matches('/'));

        let request = BrowserServiceRequest {
            url: url.to_string(),
            browser_type: self.browser_type.clone(),
            identity: identity.clone(),
            proxy: proxy.map(ProxyInfo::url),
            config: config.clone(),
            take_screenshot: false,
        };

        debug!("Sending request to browser service: {}", url);

        let response = self.client.post(&endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<BrowserServiceResponse>()
            .await?;

        if !response.success {
            let message = response.error
                .clone()
                .unwrap_or_else(|| "Browser service crawl failed with unknown error".to_string());
            error!("Browser service error: {}", message);
            return Err(if response.blocked {
                CrawlError::Blocked(message)
            } else {
                CrawlError::Fetch(message)
            });
        }

        debug!("Successfully crawled URL: {}", url);

        Ok(serde_json::to_value(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::AntiDetectionManager;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_successful_crawl() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crawl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "url": "https://example.com",
                "title": "Example",
                "content": "<html></html>",
                "links": ["https://example.com/a"],
                "screenshot": null,
                "error": null
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let service = RemoteBrowserService::new(mock_server.uri(), "chrome", Duration::from_secs(5)).unwrap();
        let identity = AntiDetectionManager::new().random_identity();
        let proxy = ProxyInfo::new("10.0.0.1", 3128);

        let result = service.fetch("https://example.com", &Value::Null, Some(&proxy), &identity).await.unwrap();
        assert_eq!(result["title"], "Example");
        assert_eq!(result["links"][0], "https://example.com/a");
    }

    #[tokio::test]
    async fn test_blocked_crawl() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crawl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "url": "https://example.com",
                "error": "captcha wall",
                "blocked": true
            })))
            .mount(&mock_server)
            .await;

        let service = RemoteBrowserService::new(mock_server.uri(), "chrome", Duration::from_secs(5)).unwrap();
        let identity = AntiDetectionManager::new().random_identity();

        let err = service.fetch("https://example.com", &Value::Null, None, &identity).await.unwrap_err();
        assert!(err.is_blocked());
    }
}
