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

//! REST API client for the warehouse endpoints.
//!
//! [`WarehouseApi`] is the seam between the query lifecycle controller and
//! the wire: query submission, by-path result fetch, and status polling.
//! Authentication is an external collaborator; this client only attaches the
//! session token it is handed.

use crate::client::http::HttpClient;
use crate::error::{Error, Result};
use crate::types::wire::{ExecRequest, ExecResponse, StatusResponse};
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;

const QUERY_REQUEST_PATH: &str = "/queries/v1/query-request";

/// The REST surface consumed by the query lifecycle controller.
#[async_trait]
pub trait WarehouseApi: Send + Sync + std::fmt::Debug {
    /// Submit a query for execution.
    async fn submit_query(&self, request: &ExecRequest) -> Result<ExecResponse>;

    /// Fetch a query result by its result path (e.g. `/queries/{id}/result`).
    async fn fetch_query_result(&self, result_path: &str) -> Result<ExecResponse>;

    /// Fetch the monitoring status records for a query id.
    async fn fetch_query_status(&self, query_id: &str) -> Result<StatusResponse>;
}

/// HTTP-backed [`WarehouseApi`] implementation.
#[derive(Debug)]
pub struct RestApiClient {
    http: Arc<HttpClient>,
    base_url: String,
    session_token: Option<String>,
}

impl RestApiClient {
    pub fn new(
        http: Arc<HttpClient>,
        base_url: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            session_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_header(&self) -> Option<String> {
        self.session_token
            .as_ref()
            .map(|token| format!("Snowflake Token=\"{token}\""))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut builder = self
            .http
            .inner()
            .request(Method::GET, self.url(path))
            .header("accept", "application/json");
        if let Some(auth) = self.auth_header() {
            builder = builder.header("Authorization", auth);
        }
        let request = builder
            .build()
            .map_err(|e| Error::http(format!("failed to build request: {e}")))?;

        let response = self.http.execute(request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("failed to read response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| Error::decode(format!("malformed response for {path}: {e}")))
    }
}

#[async_trait]
impl WarehouseApi for RestApiClient {
    async fn submit_query(&self, request: &ExecRequest) -> Result<ExecResponse> {
        debug!("submitting query (sequence {})", request.sequence_id);

        let mut builder = self
            .http
            .inner()
            .request(Method::POST, self.url(QUERY_REQUEST_PATH))
            .header("Content-Type", "application/json")
            .header("accept", "application/json")
            .json(request);
        if let Some(auth) = self.auth_header() {
            builder = builder.header("Authorization", auth);
        }
        let request = builder
            .build()
            .map_err(|e| Error::http(format!("failed to build request: {e}")))?;

        let response = self.http.execute(request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("failed to read response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| Error::decode(format!("malformed exec response: {e}")))
    }

    async fn fetch_query_result(&self, result_path: &str) -> Result<ExecResponse> {
        debug!("fetching query result at {result_path}");
        self.get_json(result_path).await
    }

    async fn fetch_query_status(&self, query_id: &str) -> Result<StatusResponse> {
        let path = format!("/monitoring/queries/{query_id}");
        debug!("fetching query status at {path}");
        self.get_json(&path).await
    }
}
