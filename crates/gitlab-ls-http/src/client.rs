//! HTTP client implementation

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Method, Response};
use tracing::debug;

use crate::{
    config::HttpConfig,
    error::{parse_retry_after, HttpError, Result},
};

/// Mockable HTTP client trait
#[async_trait]
pub trait HttpClientTrait: Send + Sync {
    /// Execute a GET request with extra headers
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<Response>;

    /// Execute a custom HTTP request
    async fn request(&self, method: Method, url: &str, headers: HeaderMap) -> Result<Response>;
}

/// Production HTTP client
pub struct HttpClient {
    inner: reqwest::Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Create a new HTTP client with configuration
    pub fn new(config: HttpConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .redirect(if config.max_redirects > 0 {
                reqwest::redirect::Policy::limited(config.max_redirects)
            } else {
                reqwest::redirect::Policy::none()
            })
            .pool_idle_timeout(config.pool_idle_timeout)
            .build()
            .map_err(|e| HttpError::BuildError(e.to_string()))?;

        Ok(Self { inner, config })
    }

    /// Create HTTP client with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(HttpConfig::default())
    }

    /// Get configuration
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<Response> {
        debug!("HTTP GET: {}", url);
        self.request(Method::GET, url, headers).await
    }

    async fn request(&self, method: Method, url: &str, headers: HeaderMap) -> Result<Response> {
        let url = url
            .parse::<url::Url>()
            .map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        let response = self
            .inner
            .request(method, url)
            .headers(headers)
            .send()
            .await
            .map_err(HttpError::RequestFailed)?;

        // Check for HTTP error status
        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers());
            return Err(HttpError::HttpStatus {
                status,
                retry_after,
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string()),
            });
        }

        Ok(response)
    }
}

/// Create a shared HTTP client (Arc-wrapped for cloning)
pub fn shared_client(config: HttpConfig) -> Result<Arc<dyn HttpClientTrait>> {
    Ok(Arc::new(HttpClient::new(config)?))
}
