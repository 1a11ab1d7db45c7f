// Copyright (c) 2025 Snowflake Rust Driver Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP client for the warehouse REST endpoints.
//!
//! Connection pooling, bounded timeouts, and automatic retry with
//! exponential backoff for transient failures. Chunk fetches against staged
//! storage URLs go through the same pooled client but skip retry here: the
//! downloader owns chunk-granularity retry.

use crate::error::{Error, Result};
use reqwest::{Client, Request, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Read timeout duration.
    pub read_timeout: Duration,
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Base delay between retry attempts (doubles each retry).
    pub retry_delay: Duration,
    /// Maximum number of idle connections per host.
    pub max_connections_per_host: usize,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            max_retries: 5,
            retry_delay: Duration::from_millis(500),
            max_connections_per_host: 100,
            user_agent: format!("snowflake-driver-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Pooled HTTP client shared by the REST client and chunk fetchers.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::http(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// The underlying pooled client, for building requests.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Execute a request with retry on transient failures.
    ///
    /// Retries 429/502/503/504 and transport errors with exponential backoff;
    /// everything else is returned immediately.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let mut attempts = 0u32;

        let method = request.method().clone();
        let url = request.url().clone();
        let headers = request.headers().clone();
        let body_bytes = request
            .body()
            .and_then(|b| b.as_bytes())
            .map(|b| b.to_vec());

        loop {
            attempts += 1;

            let mut builder = self.client.request(method.clone(), url.clone());
            for (name, value) in headers.iter() {
                builder = builder.header(name, value);
            }
            if let Some(ref body) = body_bytes {
                builder = builder.body(body.clone());
            }
            let request = builder
                .build()
                .map_err(|e| Error::http(format!("failed to build request: {e}")))?;

            debug!(
                "executing {} {} (attempt {}/{})",
                method,
                url,
                attempts,
                self.config.max_retries + 1
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if Self::is_retryable_status(status) && attempts <= self.config.max_retries {
                        warn!(
                            "request failed with {status} (attempt {attempts}/{}), retrying",
                            self.config.max_retries + 1
                        );
                        self.wait_for_retry(attempts).await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::http(format!("HTTP {} - {}", status.as_u16(), body)));
                }
                Err(e) => {
                    if Self::is_retryable_error(&e) && attempts <= self.config.max_retries {
                        warn!(
                            "request failed (attempt {attempts}/{}): {e}, retrying",
                            self.config.max_retries + 1
                        );
                        self.wait_for_retry(attempts).await;
                        continue;
                    }
                    return Err(Error::http(format!(
                        "request failed after {attempts} attempts: {e}"
                    )));
                }
            }
        }
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        )
    }

    fn is_retryable_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }

    async fn wait_for_retry(&self, attempt: u32) {
        let delay = self.config.retry_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        debug!("waiting {delay:?} before retry");
        sleep(delay).await;
    }
}
