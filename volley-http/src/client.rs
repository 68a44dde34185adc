//! HTTP client implementation

use crate::config::HttpConfig;
use crate::errors::HttpError;
use crate::types::{HttpResponse, MockResponse};
use reqwest::Client;
use std::collections::HashMap;
use tracing::{debug, trace};

/// HTTP client trait for the per-iteration request
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError>;
}

/// HTTP Manager for handling HTTP requests with mock support
#[derive(Debug, Clone)]
pub struct HttpManager {
    client: Client,
    offline: bool,
    mocks: HashMap<String, MockResponse>,
}

impl HttpManager {
    /// Create a new HttpManager in online mode with default configuration
    pub fn new() -> Result<Self, HttpError> {
        Self::with_config(HttpConfig::default())
    }

    /// Create a new HttpManager with specific configuration
    ///
    /// The underlying client is built once so connections are pooled across
    /// iterations.
    pub fn with_config(config: HttpConfig) -> Result<Self, HttpError> {
        debug!(
            "Creating HttpManager with timeout: {:?}, idle pool per host: {}",
            config.timeout,
            config.max_idle_per_host
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .redirect(reqwest::redirect::Policy::limited(
                config.max_redirects as usize,
            ))
            .build()?;

        Ok(Self {
            client,
            offline: false,
            mocks: HashMap::new(),
        })
    }

    /// Set offline mode
    pub fn set_offline(&mut self) {
        self.offline = true;
        debug!("HttpManager set to offline mode");
    }

    /// Set online mode
    pub fn set_online(&mut self) {
        self.offline = false;
        debug!("HttpManager set to online mode");
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Add a mock response for a URL
    pub fn add_mock(&mut self, url: impl Into<String>, response: MockResponse) {
        let url = url.into();
        debug!("Added HTTP mock for GET {} -> {}", url, response.status);
        self.mocks.insert(url, response);
    }

    /// Exact match first, then any mock whose URL contains or is contained by `url`
    fn find_mock(&self, url: &str) -> Option<&MockResponse> {
        self.mocks.get(url).or_else(|| {
            self.mocks
                .iter()
                .find(|(mock_url, _)| url.contains(mock_url.as_str()) || mock_url.contains(url))
                .map(|(_, response)| response)
        })
    }

    async fn get_offline(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let mock = self
            .find_mock(url)
            .cloned()
            .ok_or_else(|| HttpError::NoMock(url.to_string()))?;

        if !mock.latency.is_zero() {
            tokio::time::sleep(mock.latency).await;
        }

        trace!("Mock response for GET {}: {}", url, mock.status);
        Ok(HttpResponse {
            status: mock.status,
            body_bytes: 0,
        })
    }
}

#[async_trait::async_trait]
impl HttpClient for HttpManager {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        if self.offline {
            return self.get_offline(url).await;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();

        // Drain the body so the connection can go back to the pool
        let body = response.bytes().await?;

        trace!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse {
            status,
            body_bytes: body.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn offline_manager() -> HttpManager {
        let mut manager = HttpManager::new().unwrap();
        manager.set_offline();
        manager
    }

    #[tokio::test]
    async fn test_offline_exact_mock() {
        let mut manager = offline_manager();
        manager.add_mock("http://svc.test/health", MockResponse::status(204));

        let response = manager.get("http://svc.test/health").await.unwrap();
        assert_eq!(response.status, 204);
        assert!(response.is_expected());
    }

    #[tokio::test]
    async fn test_offline_partial_mock() {
        let mut manager = offline_manager();
        manager.add_mock("svc.test", MockResponse::status(503));

        let response = manager.get("http://svc.test/anything?x=1").await.unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_expected());
    }

    #[tokio::test]
    async fn test_offline_without_mock_fails() {
        let manager = offline_manager();
        let err = manager.get("http://svc.test/").await.unwrap_err();
        assert!(matches!(err, HttpError::NoMock(_)));
        assert!(!err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_mock_latency() {
        let mut manager = offline_manager();
        manager.add_mock(
            "http://svc.test/slow",
            MockResponse::status(200).with_latency(Duration::from_millis(250)),
        );

        let started = tokio::time::Instant::now();
        manager.get("http://svc.test/slow").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_mode_switching() {
        let mut manager = HttpManager::new().unwrap();
        assert!(!manager.is_offline());
        manager.set_offline();
        assert!(manager.is_offline());
        manager.set_online();
        assert!(!manager.is_offline());
    }
}
