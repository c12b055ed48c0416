//! REST Client Module
//!
//! Thin wrapper around `reqwest::Client` shared by the remote stores.
//! Timeouts and retries are configured here and only here; the store
//! adapters issue each request once through [`RestClient::send`].

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use tracing::warn;

use crate::error::{CacheError, Result};

// == Client Options ==
/// Pass-through configuration for the backing-store client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Retries after the first attempt, for transport errors and 5xx responses
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each subsequent one
    pub retry_backoff: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

// == Rest Client ==
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    options: ClientOptions,
    bearer_token: Option<String>,
}

impl RestClient {
    /// Builds the HTTP client. Construction is comparatively expensive, so
    /// callers hold one instance per store handle.
    ///
    /// # Arguments
    /// * `options` - Timeouts and retry policy
    /// * `bearer_token` - Optional token sent as `Authorization: Bearer`
    pub fn new(options: ClientOptions, bearer_token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CacheError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            options,
            bearer_token,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // == Send ==
    /// Sends the request produced by `build`, retrying per [`ClientOptions`].
    ///
    /// `build` is invoked once per attempt. Any response that is not a
    /// retryable 5xx is returned as-is; status checking is left to the caller.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut attempt: u32 = 0;

        loop {
            let mut request = build(&self.http);
            if let Some(token) = &self.bearer_token {
                request = request.bearer_auth(token);
            }

            let retryable = match request.send().await {
                Ok(response) if response.status().is_server_error() => {
                    if attempt >= self.options.max_retries {
                        return Ok(response);
                    }
                    format!("status {}", response.status())
                }
                Ok(response) => return Ok(response),
                Err(err) if err.is_connect() || err.is_timeout() => {
                    if attempt >= self.options.max_retries {
                        return Err(err.into());
                    }
                    err.to_string()
                }
                Err(err) => return Err(err.into()),
            };

            let delay = self
                .options
                .retry_backoff
                .saturating_mul(1u32 << attempt.min(16));
            attempt += 1;
            warn!(
                attempt,
                max_retries = self.options.max_retries,
                "store request failed ({}), retrying in {:?}",
                retryable,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

// == Status Check ==
/// Maps non-success statuses to [`CacheError::StoreUnavailable`].
pub(crate) async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CacheError::StoreUnavailable(format!(
        "{} failed with status {}: {}",
        operation, status, body
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.max_retries, 2);
    }

    #[test]
    fn test_client_builds_with_token() {
        let client = RestClient::new(ClientOptions::default(), Some("token".into())).unwrap();
        assert_eq!(client.options().max_retries, 2);
    }
}
