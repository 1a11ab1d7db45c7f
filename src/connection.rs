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

//! Connection facade: query submission, asynchronous polling, and result
//! construction.
//!
//! The connection owns the REST client, the per-connection response cache
//! (keyed by result path, invalidated only by teardown), and the
//! cancellation root for everything it spawns.

use crate::client::http::HttpClient;
use crate::client::rest::WarehouseApi;
use crate::error::{Error, Result};
use crate::query::{
    classify_status, error_from_response, AsyncSubmission, QueryCompletion, QueryResult,
};
use crate::reader::chain::ResultSetChain;
use crate::reader::downloader::ChunkDownloader;
use crate::reader::fetcher::HttpChunkFetcher;
use crate::types::options::{DriverConfig, QueryOptions};
use crate::types::wire::{ExecRequest, ExecResponse, ExecResponseData, ResultFormat};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Statement-type ids marking DML statements (insert, update, delete, merge,
/// multi-table insert).
const STATEMENT_TYPE_DML: i64 = 0x3000;
const STATEMENT_TYPE_DML_END: i64 = STATEMENT_TYPE_DML + 0x500;

/// Outcome of a non-query statement execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// DML: total row count aggregated over the returned row set.
    RowsAffected(i64),
    /// DDL and other statements without a row count.
    None,
}

/// An active connection to the warehouse.
#[derive(Debug)]
pub struct Connection {
    api: Arc<dyn WarehouseApi>,
    http: Arc<HttpClient>,
    config: DriverConfig,
    response_cache: DashMap<String, ExecResponse>,
    cancel: CancellationToken,
    sequence: AtomicU64,
}

impl Connection {
    /// Build a connection over an existing API client. The HTTP client is
    /// reused for chunk fetches.
    pub fn new(api: Arc<dyn WarehouseApi>, http: Arc<HttpClient>, config: DriverConfig) -> Self {
        Self {
            api,
            http,
            config,
            response_cache: DashMap::new(),
            cancel: CancellationToken::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Submit a query and stream its result sets.
    ///
    /// With `async_mode` set, the inline fetch is suppressed: the query is
    /// submitted asynchronously and its result polled by id before returning.
    pub async fn query(&self, sql: &str, options: QueryOptions) -> Result<QueryResult> {
        if options.async_mode {
            let submission = self.submit_async(sql).await?;
            return self.fetch_result(&submission.query_id, options).await;
        }

        let response = self.submit(sql, false).await?;
        let response = self.resolve_in_progress(response).await?;
        if !response.success {
            return Err(error_from_response(&response));
        }
        self.build_result(response.data, options).await
    }

    /// Execute a statement for its effect, aggregating DML row counts.
    pub async fn execute(&self, sql: &str) -> Result<ExecOutcome> {
        let response = self.submit(sql, false).await?;
        let response = self.resolve_in_progress(response).await?;
        if !response.success {
            return Err(error_from_response(&response));
        }

        let data = &response.data;
        if !is_dml(data.statement_type_id) {
            return Ok(ExecOutcome::None);
        }

        let first_row = data
            .row_set
            .first()
            .ok_or_else(|| Error::protocol("DML response carried no row counts"))?;
        let mut affected: i64 = 0;
        for (cell, meta) in first_row.iter().zip(&data.row_type) {
            let raw = cell.as_deref().unwrap_or("0");
            affected += raw
                .parse::<i64>()
                .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string()))?;
        }
        debug!("DML affected {affected} rows");
        Ok(ExecOutcome::RowsAffected(affected))
    }

    /// Submit a query asynchronously and probe whether it already finished.
    ///
    /// The returned query id can be handed to [`Connection::query_status`]
    /// and [`Connection::fetch_result`], including by a different consumer
    /// than the submitter.
    pub async fn submit_async(&self, sql: &str) -> Result<AsyncSubmission> {
        let response = self.submit(sql, true).await?;
        if !response.success {
            return Err(error_from_response(&response));
        }
        let query_id = response.data.query_id.clone();
        if query_id.is_empty() {
            return Err(Error::protocol(
                "asynchronous submission returned no query id",
            ));
        }

        // A status probe right after submission saves a round trip for fast
        // queries. Any non-running answer means the query is done (possibly
        // done failing); fetching the result surfaces the failure.
        let complete = match self.query_status(&query_id).await {
            Ok(QueryCompletion::Running(_)) => false,
            Ok(QueryCompletion::Complete(_)) => true,
            Err(_) => true,
        };

        Ok(AsyncSubmission { query_id, complete })
    }

    /// One status poll for a query id.
    pub async fn query_status(&self, query_id: &str) -> Result<QueryCompletion> {
        let response = self.api.fetch_query_status(query_id).await?;
        classify_status(&response, query_id)
    }

    /// Poll a query to completion, then fetch and stream its result.
    ///
    /// Running status is retried indefinitely until the connection is
    /// closed; reported errors and transport errors are terminal.
    pub async fn fetch_result(&self, query_id: &str, options: QueryOptions) -> Result<QueryResult> {
        loop {
            match self.query_status(query_id).await? {
                QueryCompletion::Complete(_) => break,
                QueryCompletion::Running(_) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        let path = format!("/queries/{query_id}/result");
        let response = self.get_query_result_resp(&path).await?;
        if !response.success {
            return Err(error_from_response(&response));
        }
        self.build_result(response.data, options).await
    }

    /// Tear the connection down: aborts in-flight work and drops the
    /// response cache.
    pub fn close(&self) {
        debug!("closing connection");
        self.cancel.cancel();
        self.response_cache.clear();
    }

    async fn submit(&self, sql: &str, async_exec: bool) -> Result<ExecResponse> {
        let request = ExecRequest {
            sql_text: sql.to_string(),
            async_exec,
            sequence_id: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            is_internal: false,
            describe_only: None,
            parameters: HashMap::new(),
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            response = self.api.submit_query(&request) => response,
        }
    }

    /// Follow `getResultUrl` while the server keeps answering with an
    /// in-progress code (bounded synchronous wait elapsed server-side).
    async fn resolve_in_progress(&self, mut response: ExecResponse) -> Result<ExecResponse> {
        while response.success && response.is_query_in_progress() {
            let path = response.data.get_result_url.clone();
            if path.is_empty() {
                return Err(Error::protocol(
                    "in-progress response carried no result url",
                ));
            }
            debug!("query in progress, following {path}");
            response = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                response = self.api.fetch_query_result(&path) => response?,
            };
        }
        Ok(response)
    }

    /// Fetch a result response by path, short-circuiting through the
    /// per-connection cache.
    async fn get_query_result_resp(&self, path: &str) -> Result<ExecResponse> {
        if let Some(cached) = self.response_cache.get(path) {
            debug!("result cache hit for {path}");
            return Ok(cached.clone());
        }
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            response = self.api.fetch_query_result(path) => response?,
        };
        if response.success {
            self.response_cache
                .insert(path.to_string(), response.clone());
        }
        Ok(response)
    }

    /// Build the result-set chain for a successful response.
    ///
    /// A multi-statement parent declares child result ids; each child's
    /// result is fetched by id and becomes one link of the chain.
    async fn build_result(
        &self,
        data: ExecResponseData,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let query_id = data.query_id.clone();

        let downloaders = if let Some(ids_raw) = data.result_ids.as_deref() {
            let ids: Vec<String> = ids_raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect();
            if ids.is_empty() {
                return Err(Error::protocol(
                    "multi-statement response declared child results but listed no ids",
                ));
            }
            debug!("multi-statement execution with {} child results", ids.len());

            let mut sets = Vec::with_capacity(ids.len());
            for id in &ids {
                let path = format!("/queries/{id}/result");
                let child = self.get_query_result_resp(&path).await?;
                if !child.success {
                    return Err(error_from_response(&child));
                }
                sets.push(self.make_downloader(&child.data, &options)?);
            }
            sets
        } else {
            vec![self.make_downloader(&data, &options)?]
        };

        let chain = ResultSetChain::new(downloaders)?;
        Ok(QueryResult::new(chain, query_id))
    }

    fn make_downloader(
        &self,
        data: &ExecResponseData,
        options: &QueryOptions,
    ) -> Result<ChunkDownloader> {
        let format = ResultFormat::from_tag(data.query_result_format.as_deref());
        let fetcher = Arc::new(HttpChunkFetcher::new(
            Arc::clone(&self.http),
            format,
            Arc::new(data.row_type.clone()),
            options.clone(),
        ));
        ChunkDownloader::new(
            data,
            fetcher,
            self.config.downloader.clone(),
            options.clone(),
            &self.cancel,
        )
    }
}

fn is_dml(statement_type_id: i64) -> bool {
    (STATEMENT_TYPE_DML..=STATEMENT_TYPE_DML_END).contains(&statement_type_id)
        && statement_type_id % 0x100 == 0
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::http::HttpClientConfig;
    use crate::types::wire::{RowType, StatusRecord, StatusResponse, StatusResponseData};
    use crate::value::TypedValue;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    fn int_row_type() -> Vec<RowType> {
        vec![RowType {
            name: "N".into(),
            column_type: "fixed".into(),
            ..Default::default()
        }]
    }

    fn inline_response(query_id: &str, values: &[i64]) -> ExecResponse {
        ExecResponse {
            success: true,
            data: ExecResponseData {
                row_type: int_row_type(),
                row_set: values.iter().map(|v| vec![Some(v.to_string())]).collect(),
                query_id: query_id.into(),
                query_result_format: Some("json".into()),
                total: values.len() as i64,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn status(status: &str) -> StatusResponse {
        StatusResponse {
            success: true,
            data: StatusResponseData {
                queries: vec![StatusRecord {
                    status: status.into(),
                    ..Default::default()
                }],
            },
            ..Default::default()
        }
    }

    /// Scripted API: fixed exec response, a queue of status answers, and
    /// responses by result path.
    #[derive(Debug)]
    struct MockApi {
        exec_response: ExecResponse,
        statuses: Mutex<Vec<StatusResponse>>,
        results: HashMap<String, ExecResponse>,
        result_fetches: AtomicUsize,
    }

    impl MockApi {
        fn new(exec_response: ExecResponse) -> Self {
            Self {
                exec_response,
                statuses: Mutex::new(Vec::new()),
                results: HashMap::new(),
                result_fetches: AtomicUsize::new(0),
            }
        }

        fn with_result(mut self, path: &str, response: ExecResponse) -> Self {
            self.results.insert(path.to_string(), response);
            self
        }

        fn with_statuses(self, statuses: Vec<StatusResponse>) -> Self {
            *self.statuses.lock().unwrap() = statuses;
            self
        }
    }

    #[async_trait]
    impl WarehouseApi for MockApi {
        async fn submit_query(&self, _request: &ExecRequest) -> Result<ExecResponse> {
            Ok(self.exec_response.clone())
        }

        async fn fetch_query_result(&self, result_path: &str) -> Result<ExecResponse> {
            self.result_fetches.fetch_add(1, Ordering::Relaxed);
            self.results
                .get(result_path)
                .cloned()
                .ok_or_else(|| Error::http(format!("no scripted response for {result_path}")))
        }

        async fn fetch_query_status(&self, _query_id: &str) -> Result<StatusResponse> {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.is_empty() {
                return Ok(status("SUCCESS"));
            }
            Ok(statuses.remove(0))
        }
    }

    fn connection(api: MockApi) -> Connection {
        connection_with(Arc::new(api))
    }

    fn connection_with(api: Arc<MockApi>) -> Connection {
        let mut config = DriverConfig::default();
        config.poll_interval = Duration::from_millis(1);
        Connection::new(
            api,
            Arc::new(HttpClient::new(HttpClientConfig::default()).unwrap()),
            config,
        )
    }

    async fn drain_ints(result: &mut QueryResult) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(row) = result.next_row().await.unwrap() {
            match row.get(0) {
                Some(TypedValue::Int(v)) => out.push(*v),
                other => panic!("unexpected value {other:?}"),
            }
        }
        out
    }

    #[tokio::test]
    async fn inline_result_streams_rows() {
        let conn = connection(MockApi::new(inline_response("q1", &[1, 2, 3])));
        let mut result = conn.query("SELECT 1", QueryOptions::default()).await.unwrap();

        assert_eq!(result.query_id(), "q1");
        assert_eq!(result.columns(), vec!["N"]);
        assert_eq!(result.total_rows(), 3);
        assert_eq!(drain_ints(&mut result).await, vec![1, 2, 3]);
        assert!(!result.has_next_result_set());
    }

    #[tokio::test]
    async fn failed_submission_surfaces_server_error() {
        let response = ExecResponse {
            success: false,
            code: Some("002003".into()),
            message: Some("Object does not exist".into()),
            ..Default::default()
        };
        let conn = connection(MockApi::new(response));
        let err = conn
            .query("SELECT * FROM missing", QueryOptions::default())
            .await
            .unwrap_err();
        match err {
            Error::QueryStatus { code, message, .. } => {
                assert_eq!(code, "002003");
                assert_eq!(message, "Object does not exist");
            }
            other => panic!("expected QueryStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn in_progress_response_follows_result_url() {
        let mut pending = ExecResponse {
            success: true,
            code: Some(crate::types::wire::QUERY_IN_PROGRESS_CODE.into()),
            ..Default::default()
        };
        pending.data.get_result_url = "/queries/q2/result".into();

        let api = MockApi::new(pending)
            .with_result("/queries/q2/result", inline_response("q2", &[7]));
        let conn = connection(api);

        let mut result = conn.query("SELECT slow()", QueryOptions::default()).await.unwrap();
        assert_eq!(drain_ints(&mut result).await, vec![7]);
    }

    #[tokio::test]
    async fn in_progress_without_url_is_protocol_violation() {
        let pending = ExecResponse {
            success: true,
            code: Some(crate::types::wire::QUERY_IN_PROGRESS_CODE.into()),
            ..Default::default()
        };
        let conn = connection(MockApi::new(pending));
        let err = conn
            .query("SELECT slow()", QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn multi_statement_chain_exposes_both_results() {
        let mut parent = ExecResponse {
            success: true,
            ..Default::default()
        };
        parent.data.query_id = "parent".into();
        parent.data.result_ids = Some("c1,c2".into());

        let api = MockApi::new(parent)
            .with_result("/queries/c1/result", inline_response("c1", &[1, 2]))
            .with_result("/queries/c2/result", inline_response("c2", &[10]));
        let conn = connection(api);

        let mut result = conn
            .query("SELECT 1; SELECT 2", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(drain_ints(&mut result).await, vec![1, 2]);
        assert!(result.has_next_result_set());
        assert!(result.next_result_set().unwrap());
        assert_eq!(drain_ints(&mut result).await, vec![10]);
        assert!(!result.next_result_set().unwrap());
    }

    #[tokio::test]
    async fn declared_but_empty_result_ids_is_protocol_violation() {
        let mut parent = ExecResponse {
            success: true,
            ..Default::default()
        };
        parent.data.result_ids = Some(" , ,".into());

        let conn = connection(MockApi::new(parent));
        let err = conn
            .query("SELECT 1; SELECT 2", QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn fetch_result_polls_until_success() {
        let api = MockApi::new(ExecResponse::default())
            .with_statuses(vec![status("QUEUED"), status("RUNNING"), status("SUCCESS")])
            .with_result("/queries/q3/result", inline_response("q3", &[5]));
        let conn = connection(api);

        let mut result = conn
            .fetch_result("q3", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(drain_ints(&mut result).await, vec![5]);
    }

    #[tokio::test]
    async fn fetch_result_surfaces_reported_error() {
        let failed = StatusResponse {
            success: true,
            data: StatusResponseData {
                queries: vec![StatusRecord {
                    status: "FAILED_WITH_ERROR".into(),
                    error_code: "000603".into(),
                    error_message: "division by zero".into(),
                    ..Default::default()
                }],
            },
            ..Default::default()
        };
        let api = MockApi::new(ExecResponse::default()).with_statuses(vec![failed]);
        let conn = connection(api);

        let err = conn
            .fetch_result("q4", QueryOptions::default())
            .await
            .unwrap_err();
        match err {
            Error::QueryStatus { code, message, query_id } => {
                assert_eq!(code, "000603");
                assert_eq!(message, "division by zero");
                assert_eq!(query_id, "q4");
            }
            other => panic!("expected QueryStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn result_cache_short_circuits_repeated_fetches() {
        let api = Arc::new(
            MockApi::new(ExecResponse::default())
                .with_result("/queries/q5/result", inline_response("q5", &[1])),
        );
        let conn = connection_with(Arc::clone(&api));

        let _ = conn.fetch_result("q5", QueryOptions::default()).await.unwrap();
        let _ = conn.fetch_result("q5", QueryOptions::default()).await.unwrap();

        assert_eq!(api.result_fetches.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn submit_async_reports_running_as_incomplete() {
        let mut response = inline_response("q6", &[]);
        response.data.row_set.clear();
        let api = MockApi::new(response).with_statuses(vec![status("RUNNING")]);
        let conn = connection(api);

        let submission = conn.submit_async("SELECT long_running()").await.unwrap();
        assert_eq!(submission.query_id, "q6");
        assert!(!submission.complete);
    }

    #[tokio::test]
    async fn submit_async_reports_finished_as_complete() {
        let api = MockApi::new(inline_response("q7", &[])).with_statuses(vec![status("SUCCESS")]);
        let conn = connection(api);

        let submission = conn.submit_async("SELECT 1").await.unwrap();
        assert!(submission.complete);
    }

    #[tokio::test]
    async fn execute_sums_dml_row_counts() {
        let mut response = ExecResponse {
            success: true,
            ..Default::default()
        };
        response.data.statement_type_id = 0x3100; // insert
        response.data.row_type = vec![
            RowType {
                name: "number of rows inserted".into(),
                column_type: "fixed".into(),
                ..Default::default()
            },
            RowType {
                name: "number of rows updated".into(),
                column_type: "fixed".into(),
                ..Default::default()
            },
        ];
        response.data.row_set = vec![vec![Some("3".into()), Some("4".into())]];

        let conn = connection(MockApi::new(response));
        let outcome = conn.execute("INSERT ...").await.unwrap();
        assert_eq!(outcome, ExecOutcome::RowsAffected(7));
    }

    #[tokio::test]
    async fn execute_ddl_has_no_row_count() {
        let mut response = ExecResponse {
            success: true,
            ..Default::default()
        };
        response.data.statement_type_id = 0x1000;
        let conn = connection(MockApi::new(response));
        assert_eq!(conn.execute("CREATE TABLE t(a int)").await.unwrap(), ExecOutcome::None);
    }

    #[test]
    fn dml_statement_type_range() {
        for id in [0x3000i64, 0x3100, 0x3200, 0x3300, 0x3400, 0x3500] {
            assert!(is_dml(id), "{id:#x} should be DML");
        }
        for id in [0x1000i64, 0x2000, 0x3001, 0x3600, 0x30ff] {
            assert!(!is_dml(id), "{id:#x} should not be DML");
        }
    }

    #[tokio::test]
    async fn close_cancels_pending_polling() {
        let api = MockApi::new(ExecResponse::default())
            .with_statuses(vec![status("RUNNING"); 10_000]);
        let conn = Arc::new(connection(api));

        let poller = Arc::clone(&conn);
        let handle = tokio::spawn(async move {
            poller.fetch_result("q8", QueryOptions::default()).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        conn.close();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("polling should stop promptly")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
