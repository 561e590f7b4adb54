use anyhow::{Context, Result};
use reqwest::{Client, Request, Response};
use std::time::Duration;

use crate::error::ApiError;

/// Shared HTTP client for all upstream services (OpenAI, Pinecone, Supabase,
/// SendGrid) with connection pooling and retry logic.
pub struct UpstreamClient {
    client: Client,

    /// Maximum number of retries
    max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    base_delay_ms: u64,
}

impl UpstreamClient {
    /// Create a new upstream client
    pub fn new(
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            max_retries,
            base_delay_ms: 1000,
        })
    }

    /// Execute a request with retry logic.
    ///
    /// 429 and 5xx responses are retried with exponential backoff, as are
    /// transport errors. Any other response (success or client error) is
    /// returned to the caller, which maps error statuses onto its own
    /// service-specific `ApiError` variant.
    pub async fn request_with_retry(&self, request: Request) -> Result<Response, ApiError> {
        self.request_internal(request, true).await
    }

    /// Execute a request without retries (for startup/initialization).
    /// Fails fast on any transport error.
    pub async fn request_no_retry(&self, request: Request) -> Result<Response, ApiError> {
        self.request_internal(request, false).await
    }

    async fn request_internal(
        &self,
        request: Request,
        enable_retry: bool,
    ) -> Result<Response, ApiError> {
        let max_retries = if enable_retry { self.max_retries } else { 0 };
        let mut attempt = 0;

        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        loop {
            // Clone the request for this attempt
            let req = request.try_clone().ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!("Request body is not cloneable"))
            })?;

            let result = self.client.execute(req).await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    tracing::debug!(status = %status, "Received HTTP response");

                    if status.is_success() {
                        return Ok(response);
                    }

                    if matches!(status.as_u16(), 429 | 500..=599) && attempt < max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            "Received {}, retrying after {}ms (attempt {}/{})",
                            status,
                            delay,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    // Non-retryable error or max retries exceeded; hand the
                    // response back so the caller can extract the body
                    tracing::warn!(
                        status = status.as_u16(),
                        url = %url,
                        attempt = attempt + 1,
                        "HTTP request returned error status"
                    );
                    return Ok(response);
                }

                Err(e) => {
                    let error_kind = if e.is_timeout() {
                        "timeout"
                    } else if e.is_connect() {
                        "connection_failed"
                    } else if e.is_request() {
                        "request_error"
                    } else if e.is_body() {
                        "body_error"
                    } else if e.is_decode() {
                        "decode_error"
                    } else {
                        "unknown"
                    };

                    if attempt < max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            "Request failed: {} ({}), retrying after {}ms (attempt {}/{})",
                            e,
                            error_kind,
                            delay,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(
                        error_kind = error_kind,
                        error = %e,
                        url = %url,
                        total_attempts = attempt + 1,
                        "HTTP request failed after all retries"
                    );

                    return Err(ApiError::UpstreamError(format!(
                        "HTTP request failed: {} (kind: {})",
                        e, error_kind
                    )));
                }
            }
        }
    }

    /// Calculate exponential backoff delay with jitter
    fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let delay = self.base_delay_ms * 2_u64.pow(attempt);
        let jitter = (delay as f64 * 0.1 * rand::random()) as u64;
        delay + jitter
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

// Simple random number generation for jitter
mod rand {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};

    pub fn random() -> f64 {
        let state = RandomState::new();
        let mut hasher = state.build_hasher();
        std::time::SystemTime::now().hash(&mut hasher);
        (hasher.finish() % 1000) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let client = UpstreamClient::new(20, 30, 300, 3).unwrap();

        let delay0 = client.calculate_backoff_delay(0);
        let delay1 = client.calculate_backoff_delay(1);
        let delay2 = client.calculate_backoff_delay(2);

        // Each delay should be roughly double the previous (with jitter)
        assert!((1000..=1200).contains(&delay0));
        assert!((2000..=2400).contains(&delay1));
        assert!((4000..=4800).contains(&delay2));
    }

    #[tokio::test]
    async fn test_client_error_is_returned_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/thing")
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let client = UpstreamClient::new(5, 5, 5, 3).unwrap();
        let req = client
            .client()
            .get(format!("{}/thing", server.url()))
            .build()
            .unwrap();

        let response = client.request_with_retry(req).await.unwrap();
        assert_eq!(response.status().as_u16(), 400);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/flaky")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let client = UpstreamClient::new(5, 5, 5, 1).unwrap();
        let req = client
            .client()
            .get(format!("{}/flaky", server.url()))
            .build()
            .unwrap();

        // One retry configured: both attempts hit the mock, the final 500 is
        // handed back to the caller
        let response = client.request_with_retry(req).await.unwrap();
        assert_eq!(response.status().as_u16(), 500);
        failing.assert_async().await;
    }
}
