use std::time::Duration;

use reqwest::{Client, ClientBuilder, header};
use tracing::{debug, instrument};
use url::Url;

use crate::fetcher::{
    errors::FetchError, pipeline::process_response, throttle::HostThrottle, types::PageResponse,
};
use crate::retry::{RetryPolicy, retry};

const MAX_BODY_SIZE: u64 = 5 * 1024 * 1024; // 5MB

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const ACCEPT: &str = "text/html,application/xhtml+xml,application/rss+xml,\
     application/atom+xml,application/xml;q=0.9,*/*;q=0.8";

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub user_agent: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_body_bytes: u64,
    /// Minimum spacing between two requests to the same host.
    pub politeness_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            max_body_bytes: MAX_BODY_SIZE,
            politeness_delay: Duration::from_millis(500),
            // first attempt plus two retries
            retry: RetryPolicy::exponential(3, Duration::from_millis(500)),
        }
    }
}

/// Shared HTTP client for feeds, landing pages and article bodies.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    throttle: HostThrottle,
    options: FetcherOptions,
}

impl HttpFetcher {
    pub fn new(options: FetcherOptions) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.9,zh-CN;q=0.8,*;q=0.5"),
        );

        let client = ClientBuilder::new()
            .connect_timeout(options.connect_timeout)
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            throttle: HostThrottle::new(options.politeness_delay),
            options,
        })
    }

    pub fn options(&self) -> &FetcherOptions {
        &self.options
    }

    /// Fetch with the configured retry policy.
    pub async fn fetch(&self, url: &str) -> Result<PageResponse, FetchError> {
        self.fetch_with(url, self.options.retry).await
    }

    pub async fn fetch_with(
        &self,
        url: &str,
        policy: RetryPolicy,
    ) -> Result<PageResponse, FetchError> {
        let parsed = Url::parse(url)?;
        retry(policy, FetchError::should_retry, || self.fetch_once(&parsed)).await
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn fetch_once(&self, url: &Url) -> Result<PageResponse, FetchError> {
        if let Some(host) = url.host_str() {
            self.throttle.wait(host).await;
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(FetchError::from_reqwest_error)?;

        if let Some(content_length) = response.content_length()
            && content_length > self.options.max_body_bytes
        {
            return Err(FetchError::BodyTooLarge(content_length));
        }

        let final_url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            return Err(FetchError::from_status(status));
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        if !is_supported_content_type(&content_type) {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let body_bytes = response.bytes().await.map_err(FetchError::from_reqwest_error)?;

        // Content-Length may be absent or wrong
        if body_bytes.len() as u64 > self.options.max_body_bytes {
            return Err(FetchError::BodyTooLarge(body_bytes.len() as u64));
        }

        debug!(status = status.as_u16(), bytes = body_bytes.len(), "fetched");
        Ok(process_response(final_url, status, headers, body_bytes, &content_type))
    }
}

fn is_supported_content_type(content_type: &str) -> bool {
    content_type.contains("text/html")
        || content_type.contains("application/xhtml")
        || content_type.contains("xml")
        || content_type.starts_with("text/plain")
}
