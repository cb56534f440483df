//! Retrying HTTP transport for the storefront API.
//!
//! This module owns **only** the retry/backoff policy around a single
//! request. What gets retried:
//!
//! - HTTP 429: wait `Retry-After` seconds when the header parses, else
//!   `2^attempt` seconds, then retry the same request.
//! - reqwest transport errors (DNS, refused connection, timeout): wait
//!   `2^attempt` seconds, then retry.
//!
//! Every other response, success or not, is returned to the caller on the
//! first attempt; classifying non-429 HTTP errors is the client's job, not
//! the transport's.

use std::fmt;
use std::time::Duration;

use tracing::warn;

/// Default attempt ceiling for [`RetryingTransport`].
pub const DEFAULT_MAX_RETRIES: u32 = 5;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// All retry attempts were consumed without obtaining a response.
///
/// Carries the last observed failure so run-level error messages can say
/// what the upstream was doing when the budget ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportExhausted {
    /// How many attempts were made (equals the configured `max_retries`).
    pub attempts: u32,
    /// Description of the last failure (status line or transport error).
    pub last: String,
}

impl fmt::Display for TransportExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transport exhausted after {} attempts; last failure: {}",
            self.attempts, self.last
        )
    }
}

impl std::error::Error for TransportExhausted {}

// ---------------------------------------------------------------------------
// RetryingTransport
// ---------------------------------------------------------------------------

/// Wraps a `reqwest::Client` with bounded retry for rate limiting and
/// transient transport failures.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    http: reqwest::Client,
    max_retries: u32,
}

impl RetryingTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_max_retries(http, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(http: reqwest::Client, max_retries: u32) -> Self {
        Self { http, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Send a request, retrying on 429 and transport errors.
    ///
    /// `build_request` is called once per attempt; it receives the underlying
    /// client and must return a fully configured `RequestBuilder` (URL, auth,
    /// query params). Each wait decision is logged with the attempt number
    /// and duration.
    pub async fn send<F>(&self, build_request: F) -> Result<reqwest::Response, TransportExhausted>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut last = String::from("no attempts made");

        for attempt in 0..self.max_retries {
            let req = build_request(&self.http);
            match req.send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    last = "HTTP 429 rate limited".to_string();
                    if attempt + 1 == self.max_retries {
                        break;
                    }
                    let wait_secs = retry_after_secs(&resp).unwrap_or(1u64 << attempt);
                    warn!(attempt, wait_secs, "storefront rate limited; backing off");
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    last = e.to_string();
                    if attempt + 1 == self.max_retries {
                        break;
                    }
                    let wait_secs = 1u64 << attempt;
                    warn!(attempt, wait_secs, error = %e, "storefront request failed; backing off");
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                }
            }
        }

        Err(TransportExhausted {
            attempts: self.max_retries,
            last,
        })
    }
}

/// Parse a `Retry-After` header as whole seconds. HTTP-date forms are not
/// produced by the storefront and fall through to exponential backoff.
fn retry_after_secs(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Instant;

    fn transport(max_retries: u32) -> RetryingTransport {
        RetryingTransport::with_max_retries(reqwest::Client::new(), max_retries)
    }

    #[tokio::test]
    async fn rate_limited_once_waits_retry_after_then_succeeds() {
        let server = MockServer::start_async().await;
        let mut rate_limited = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(429).header("Retry-After", "2");
            })
            .await;

        let url = server.url("/ping");
        let t = transport(5);
        let started = Instant::now();

        let handle = tokio::spawn(async move {
            t.send(|http| http.get(&url)).await
        });

        // Swap the mock to 200 while the transport sleeps out its 2 s wait.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(rate_limited.hits_async().await, 1);
        rate_limited.delete_async().await;
        let ok = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200).body("pong");
            })
            .await;

        let resp = handle.await.unwrap().unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(ok.hits_async().await, 1);
        assert!(
            started.elapsed() >= Duration::from_secs(2),
            "Retry-After wait was not honored: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn always_rate_limited_exhausts_after_max_retries() {
        let server = MockServer::start_async().await;
        let rate_limited = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                // No Retry-After: exponential backoff path (1 s, 2 s).
                then.status(429);
            })
            .await;

        let url = server.url("/ping");
        let err = transport(3).send(|http| http.get(&url)).await.unwrap_err();

        assert_eq!(rate_limited.hits_async().await, 3);
        assert_eq!(err.attempts, 3);
        assert!(err.last.contains("429"), "last failure: {}", err.last);
    }

    #[tokio::test]
    async fn network_error_exhausts_with_last_error() {
        // Nothing listens on port 1; every attempt fails at connect time.
        let t = transport(1);
        let err = t
            .send(|http| http.get("http://127.0.0.1:1/ping"))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(!err.last.is_empty());
    }

    #[tokio::test]
    async fn non_429_error_status_returned_immediately() {
        let server = MockServer::start_async().await;
        let failing = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(500).body("boom");
            })
            .await;

        let url = server.url("/ping");
        let resp = transport(5).send(|http| http.get(&url)).await.unwrap();

        assert_eq!(resp.status(), 500);
        assert_eq!(failing.hits_async().await, 1, "5xx must not be retried");
    }

    #[tokio::test]
    async fn success_returns_on_first_attempt() {
        let server = MockServer::start_async().await;
        let ok = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200).body("pong");
            })
            .await;

        let url = server.url("/ping");
        let resp = transport(5).send(|http| http.get(&url)).await.unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(ok.hits_async().await, 1);
    }
}
