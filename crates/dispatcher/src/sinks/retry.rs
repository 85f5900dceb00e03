//! RetryingClient - reqwest client with bounded concurrency and backoff
//!
//! Transport errors and 5xx responses are retried with exponential backoff.
//! Any other response is returned to the caller as-is.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Response};
use tokio::sync::Semaphore;
use tracing::debug;

/// Retry and concurrency settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry
    pub base_delay: Duration,
    /// Cap on a single backoff delay
    pub max_delay: Duration,
    /// Requests allowed in flight at once
    pub concurrency: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            concurrency: 32,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// HTTP client applying a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryingClient {
    client: Client,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl RetryingClient {
    /// Build a client with a per-attempt timeout
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let permits = Arc::new(Semaphore::new(policy.concurrency.max(1)));
        Ok(Self {
            client,
            policy,
            permits,
        })
    }

    /// Active policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// POST a JSON body, retrying transport errors and 5xx responses
    ///
    /// Returns the last response (possibly a 5xx) once attempts run out, or
    /// the last transport error if no attempt produced a response.
    pub async fn post_json(&self, url: &str, body: Bytes) -> Result<Response, reqwest::Error> {
        // The semaphore is never closed.
        let _permit = self.permits.acquire().await.ok();

        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let result = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await;

            let retryable = match &result {
                Ok(resp) => resp.status().is_server_error(),
                Err(_) => true,
            };
            if !retryable || attempt + 1 >= attempts {
                return result;
            }

            let delay = self.policy.delay_for_attempt(attempt);
            match &result {
                Ok(resp) => debug!(url, status = resp.status().as_u16(), attempt, ?delay, "Retrying request"),
                Err(e) => debug!(url, error = %e, attempt, ?delay, "Retrying request"),
            }
            // Drop the failed response so its connection goes back to the pool.
            drop(result);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Router};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            concurrency: 4,
        }
    }

    /// Server answering with `statuses` in order, then 204 forever
    async fn scripted_server(statuses: Vec<u16>) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/v1/data",
            post(move || {
                let counter = Arc::clone(&counter);
                let statuses = statuses.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) as usize;
                    let code = statuses.get(n).copied().unwrap_or(204);
                    StatusCode::from_u16(code).unwrap()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1/data"), hits)
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let (url, hits) = scripted_server(vec![503, 500]).await;
        let client = RetryingClient::new(Duration::from_secs(5), fast_policy(3)).unwrap();

        let resp = client.post_json(&url, Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 204);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_server_error() {
        let (url, hits) = scripted_server(vec![500, 500, 502]).await;
        let client = RetryingClient::new(Duration::from_secs(5), fast_policy(3)).unwrap();

        let resp = client.post_json(&url, Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 502);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_not_retried() {
        let (url, hits) = scripted_server(vec![400]).await;
        let client = RetryingClient::new(Duration::from_secs(5), fast_policy(3)).unwrap();

        let resp = client.post_json(&url, Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_error_after_attempts() {
        let client = RetryingClient::new(Duration::from_secs(1), fast_policy(2)).unwrap();
        let result = client
            .post_json("http://127.0.0.1:1/v1/data", Bytes::from_static(b"{}"))
            .await;
        assert!(result.is_err());
    }
}
