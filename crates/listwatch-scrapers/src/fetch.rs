use async_trait::async_trait;
use listwatch_core::{Result, WatchError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.8,*/*;q=0.7";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7";

/// What came back from one GET.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`. Non-success statuses are returned, not raised; an
    /// error means no response arrived at all.
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        (**self).fetch(url).await
    }
}

/// Plain HTTP client with browser-like headers and a request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_language(timeout, DEFAULT_ACCEPT_LANGUAGE)
    }

    pub fn with_language(timeout: Duration, accept_language: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(accept_language)
                .map_err(|e| WatchError::Config(format!("invalid Accept-Language: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let url = normalize_url(url);
        debug!("Fetching {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        debug!("{} answered {} with {} bytes", url, status, body.len());
        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Query specs are stored as typed; a missing scheme means HTTPS.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
