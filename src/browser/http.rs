use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::browser::fingerprint::ClientIdentity;
use crate::crawler::Fetcher;
use crate::error::{CrawlError, CrawlResult};
use crate::proxy::ProxyInfo;

/// Plain HTTP fetch engine: one GET through the leased proxy with the drawn identity
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build_client(&self, proxy: Option<&ProxyInfo>, identity: &ClientIdentity) -> CrawlResult<Client> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .cookie_store(true)
            .user_agent(identity.user_agent.clone());

        if let Some(proxy) = proxy {
            let proxy_url = proxy.url();
            let proxy = reqwest::Proxy::all(&proxy_url)?;
            builder = builder.proxy(proxy);
        }

        Ok(builder.build()?)
    }
}

/// Identity headers plus any `headers` object in the task config
fn request_headers(identity: &ClientIdentity, config: &Value) -> HeaderMap {
    let extra = config.get("headers")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
        .filter_map(|(name, value)| value.as_str().map(|value| (name.as_str(), value)));

    let mut headers = HeaderMap::new();
    for (name, value) in identity.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).chain(extra) {
        // The client is built without decompression support
        if name.eq_ignore_ascii_case("accept-encoding") {
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping invalid header: {}", name),
        }
    }
    headers
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        config: &Value,
        proxy: Option<&ProxyInfo>,
        identity: &ClientIdentity,
    ) -> CrawlResult<Value> {
        let client = self.build_client(proxy, identity)?;

        debug!("Fetching {} via {}", url, proxy.map(ProxyInfo::address).unwrap_or_else(|| "direct".to_string()));

        let response = client.get(url)
            .headers(request_headers(identity, config))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CrawlError::Blocked(format!("{} answered {}", url, status)));
        }
        if !status.is_success() {
            return Err(CrawlError::Fetch(format!("{} answered {}", url, status)));
        }

        let final_url = response.url().to_string();
        let content_type = response.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;

        Ok(json!({
            "url": final_url,
            "status_code": status.as_u16(),
            "content_type": content_type,
            "content": body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::AntiDetectionManager;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_sends_identity_headers() {
        let mock_server = MockServer::start().await;
        let identity = AntiDetectionManager::new().random_identity();

        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("User-Agent", identity.user_agent.as_str()))
            .and(header("X-Trace", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hello</html>"))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5));
        let config = json!({ "headers": { "X-Trace": "abc" } });
        let url = format!("{}/page", mock_server.uri());

        let result = fetcher.fetch(&url, &config, None, &identity).await.unwrap();
        assert_eq!(result["status_code"], 200);
        assert_eq!(result["content"], "<html>hello</html>");
    }

    #[tokio::test]
    async fn test_forbidden_is_blocked() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5));
        let identity = AntiDetectionManager::new().random_identity();
        let err = fetcher.fetch(&mock_server.uri(), &Value::Null, None, &identity).await.unwrap_err();
        assert!(err.is_blocked());
    }

    #[tokio::test]
    async fn test_server_error_is_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5));
        let identity = AntiDetectionManager::new().random_identity();
        let err = fetcher.fetch(&mock_server.uri(), &Value::Null, None, &identity).await.unwrap_err();
        assert!(matches!(err, CrawlError::Fetch(_)));
    }
}
