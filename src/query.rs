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

//! Query lifecycle: status vocabulary, response classification, and the
//! consumer-facing result handle.
//!
//! A submitted query ends up in one of three places: an inline result (the
//! common case), an asynchronous placeholder the caller must poll, or an
//! in-progress code meaning a bounded synchronous wait elapsed. Polling maps
//! the server's status vocabulary onto running / reported-error / success;
//! running is retryable until the caller cancels, reported errors are
//! terminal and carry the server's code and message.

use crate::error::{Error, Result};
use crate::reader::chain::ResultSetChain;
use crate::reader::Row;
use crate::types::wire::{ExecResponse, RowType, StatusRecord, StatusResponse};
use arrow_array::RecordBatch;

/// Server-side query status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatusKind {
    Running,
    Aborting,
    Success,
    FailedWithError,
    Aborted,
    Queued,
    FailedWithIncident,
    Disconnected,
    ResumingWarehouse,
    QueuedRepairingWarehouse,
    Restarted,
    Blocked,
    NoData,
}

impl QueryStatusKind {
    pub fn from_status(status: &str) -> Option<Self> {
        Some(match status {
            "RUNNING" => Self::Running,
            "ABORTING" => Self::Aborting,
            "SUCCESS" => Self::Success,
            "FAILED_WITH_ERROR" => Self::FailedWithError,
            "ABORTED" => Self::Aborted,
            "QUEUED" => Self::Queued,
            "FAILED_WITH_INCIDENT" => Self::FailedWithIncident,
            "DISCONNECTED" => Self::Disconnected,
            "RESUMING_WAREHOUSE" => Self::ResumingWarehouse,
            "QUEUED_REPAIRING_WAREHOUSE" => Self::QueuedRepairingWarehouse,
            "RESTARTED" => Self::Restarted,
            "BLOCKED" => Self::Blocked,
            "NO_DATA" => Self::NoData,
            _ => return None,
        })
    }

    /// Statuses to keep polling on.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Self::Running
                | Self::ResumingWarehouse
                | Self::Queued
                | Self::QueuedRepairingWarehouse
                | Self::NoData
        )
    }

    /// Statuses that are terminal failures reported by the server.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::Aborting
                | Self::FailedWithError
                | Self::Aborted
                | Self::FailedWithIncident
                | Self::Disconnected
                | Self::Blocked
        )
    }
}

/// Outcome of one status poll for a query that has not failed.
#[derive(Debug, Clone)]
pub enum QueryCompletion {
    /// The query finished; its result can be fetched by id.
    Complete(StatusRecord),
    /// Still executing; poll again.
    Running(StatusRecord),
}

/// Classify a monitoring response for `query_id`.
///
/// Server-reported failures become [`Error::QueryStatus`] carrying the
/// server's code and message; a structurally useless response is a protocol
/// violation.
pub(crate) fn classify_status(response: &StatusResponse, query_id: &str) -> Result<QueryCompletion> {
    if !response.success || response.data.queries.is_empty() {
        return Err(Error::protocol(format!(
            "status request for query {query_id} returned no status"
        )));
    }

    let record = response.data.queries[0].clone();

    if !record.error_code.is_empty() {
        return Err(Error::QueryStatus {
            code: record.error_code.clone(),
            message: record.error_message.clone(),
            query_id: query_id.to_string(),
        });
    }

    let Some(kind) = QueryStatusKind::from_status(&record.status) else {
        return Err(Error::protocol(format!(
            "unknown query status {:?} for query {query_id}",
            record.status
        )));
    };

    if kind.is_error() {
        return Err(Error::QueryStatus {
            code: record.status.clone(),
            message: record.error_message.clone(),
            query_id: query_id.to_string(),
        });
    }
    if kind.is_running() {
        return Ok(QueryCompletion::Running(record));
    }
    Ok(QueryCompletion::Complete(record))
}

/// Build the terminal error for an unsuccessful exec response.
pub(crate) fn error_from_response(response: &ExecResponse) -> Error {
    Error::QueryStatus {
        code: response.code.clone().unwrap_or_default(),
        message: response.message.clone().unwrap_or_default(),
        query_id: response.data.query_id.clone(),
    }
}

/// Handle returned by an asynchronous submission.
#[derive(Debug, Clone)]
pub struct AsyncSubmission {
    /// Identifier to poll status and fetch the result with.
    pub query_id: String,
    /// Whether the query had already finished at submission time. A completed
    /// query may still have failed; fetching the result surfaces that.
    pub complete: bool,
}

/// A query's result sets, consumed row by row.
#[derive(Debug)]
pub struct QueryResult {
    chain: ResultSetChain,
    query_id: String,
}

impl QueryResult {
    pub(crate) fn new(chain: ResultSetChain, query_id: String) -> Self {
        Self { chain, query_id }
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Column metadata of the active result set.
    pub fn row_type(&self) -> &[RowType] {
        self.chain.row_type()
    }

    /// Column names of the active result set.
    pub fn columns(&self) -> Vec<&str> {
        self.chain.columns()
    }

    /// Total row count the server declared for the active result set.
    pub fn total_rows(&self) -> i64 {
        self.chain.total_rows()
    }

    /// Deliver the next row; `Ok(None)` at end of data.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        self.chain.next_row().await
    }

    /// Whether another statement's result set follows the active one.
    pub fn has_next_result_set(&self) -> bool {
        self.chain.has_next_result_set()
    }

    /// Advance to the next statement's result set. Returns `false` at the
    /// end of the chain.
    pub fn next_result_set(&mut self) -> Result<bool> {
        self.chain.next_result_set()
    }

    /// Drain the active result set as raw columnar batches
    /// (arrow-batches mode only).
    pub async fn take_batches(&mut self) -> Result<Vec<RecordBatch>> {
        self.chain.take_batches().await
    }

    /// Abort fetching. Safe to call from a consumer other than the original
    /// submitter; dropping the result has the same effect.
    pub fn close(&self) {
        self.chain.cancel();
    }
}
