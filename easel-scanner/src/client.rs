use crate::error::{Result, ScanError};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Bounded retry budget applied to every GET issued through [`HttpClient`].
///
/// `total` caps the number of retries of any kind, `connect` and `read` cap
/// retries for connection and post-connect failures respectively. Responses
/// whose status is in `status_forcelist` are retried against `total` only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub total: u32,
    pub connect: u32,
    pub read: u32,
    pub backoff_factor: Duration,
    pub status_forcelist: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total: 3,
            connect: 3,
            read: 3,
            backoff_factor: Duration::from_millis(300),
            status_forcelist: vec![500, 502, 504],
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            total: 0,
            connect: 0,
            read: 0,
            backoff_factor: Duration::ZERO,
            status_forcelist: Vec::new(),
        }
    }

    /// Delay before the given retry (1-indexed): factor, 2*factor, 4*factor...
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_factor.saturating_mul(1u32 << exponent)
    }

    fn retries_status(&self, status: u16) -> bool {
        self.status_forcelist.contains(&status)
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub session_cookie: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            session_cookie: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Connect,
    Read,
    Status,
}

/// Shared, cheaply cloneable session handle. Every clone reuses the same
/// connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_options(ClientOptions::default())
    }

    pub fn with_options(options: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = options.session_cookie.as_deref() {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| ScanError::Other(format!("Invalid session cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .user_agent(options.user_agent)
            .default_headers(headers)
            // Bounds connecting and each read, never the whole transfer.
            .connect_timeout(Duration::from_secs(options.timeout_secs))
            .read_timeout(Duration::from_secs(options.timeout_secs))
            .pool_max_idle_per_host(16) // Connection pooling
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            retry: options.retry,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET `url`, retrying transient failures. Non-success statuses are
    /// returned as [`ScanError::HttpStatus`].
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send_with_retry(url, || self.client.get(url)).await
    }

    pub async fn get_with_query(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        self.send_with_retry(url, || self.client.get(url).query(query))
            .await
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0u32;
        let mut connect_retries = 0u32;
        let mut read_retries = 0u32;

        loop {
            let (error, kind) = match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let error = ScanError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    };
                    if !self.retry.retries_status(status.as_u16()) {
                        return Err(error);
                    }
                    (error, FailureKind::Status)
                }
                Err(e) => {
                    let kind = if e.is_connect() {
                        FailureKind::Connect
                    } else if e.is_timeout() || e.is_request() || e.is_body() {
                        FailureKind::Read
                    } else {
                        return Err(e.into());
                    };
                    (ScanError::HttpError(e), kind)
                }
            };

            let budget_left = retries < self.retry.total
                && match kind {
                    FailureKind::Connect => connect_retries < self.retry.connect,
                    FailureKind::Read => read_retries < self.retry.read,
                    FailureKind::Status => true,
                };
            if !budget_left {
                warn!(url = %url, retries, "Giving up after retries: {}", error);
                return Err(error);
            }

            retries += 1;
            match kind {
                FailureKind::Connect => connect_retries += 1,
                FailureKind::Read => read_retries += 1,
                FailureKind::Status => {}
            }

            let delay = self.retry.backoff(retries);
            debug!(url = %url, retry = retries, ?delay, "Retrying after: {}", error);
            tokio::time::sleep(delay).await;
        }
    }
}
