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

//! Wire request/response types for the warehouse REST API.
//!
//! These map directly to the JSON structures of the query-request, by-id
//! result, and monitoring endpoints. Fields the driver does not consume
//! (file-transfer staging, session parameters beyond name/value) are omitted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server-side response codes signaling that a synchronous wait timed out
/// and the result must be fetched via `getResultUrl`.
pub const QUERY_IN_PROGRESS_CODE: &str = "333333";
/// Same as [`QUERY_IN_PROGRESS_CODE`] but for asynchronously submitted queries.
pub const QUERY_IN_PROGRESS_ASYNC_CODE: &str = "333334";

/// Encoding of row data in a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    /// Textual rows: JSON arrays of nullable strings.
    #[default]
    Json,
    /// Binary columnar record batches (Arrow IPC stream).
    Arrow,
}

impl ResultFormat {
    /// Parse the `queryResultFormat` tag; unknown tags fall back to JSON.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("arrow") => ResultFormat::Arrow,
            _ => ResultFormat::Json,
        }
    }
}

/// Per-column metadata, one ordered sequence per result set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowType {
    pub name: String,
    #[serde(default)]
    pub byte_length: Option<i64>,
    #[serde(default)]
    pub length: Option<i64>,
    /// Logical type tag: `fixed`, `real`, `text`, `boolean`, `binary`,
    /// `date`, `time`, `timestamp_ntz`, `timestamp_ltz`, `timestamp_tz`,
    /// `object`, `variant`, `array`.
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub precision: i64,
    #[serde(default)]
    pub scale: i64,
    #[serde(default)]
    pub nullable: bool,
}

/// Descriptor of a remotely stored result chunk. Consumed exactly once by
/// a fetch operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponseChunk {
    pub url: String,
    pub row_count: i64,
    #[serde(default)]
    pub uncompressed_size: i64,
    #[serde(default)]
    pub compressed_size: i64,
}

/// Body of a query submission request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    #[serde(rename = "sqlText")]
    pub sql_text: String,
    pub async_exec: bool,
    pub sequence_id: u64,
    pub is_internal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub describe_only: Option<bool>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub parameters: HashMap<String, String>,
}

/// Data section of an exec or by-id result response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponseData {
    #[serde(rename = "rowtype", default)]
    pub row_type: Vec<RowType>,
    /// Inline textual rows (JSON format).
    #[serde(rename = "rowset", default)]
    pub row_set: Vec<Vec<Option<String>>>,
    /// Inline columnar rows: base64-encoded Arrow IPC stream (arrow format).
    #[serde(rename = "rowsetbase64", default)]
    pub row_set_base64: String,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub returned: i64,
    #[serde(rename = "queryId", default)]
    pub query_id: String,
    #[serde(rename = "sqlState", default)]
    pub sql_state: String,
    #[serde(rename = "statementTypeId", default)]
    pub statement_type_id: i64,
    #[serde(default)]
    pub chunks: Vec<ExecResponseChunk>,
    /// Symmetric decryption key for remote chunks; expanded into the
    /// SSE-C header pair when `chunk_headers` is absent.
    #[serde(default)]
    pub qrmk: String,
    #[serde(rename = "chunkHeaders", default)]
    pub chunk_headers: HashMap<String, String>,
    /// Relative path to poll when the response carries an in-progress code.
    #[serde(rename = "getResultUrl", default)]
    pub get_result_url: String,
    /// Comma-separated child result identifiers for multi-statement execution.
    /// `None` when the response is not a multi-statement parent.
    #[serde(rename = "resultIds", default)]
    pub result_ids: Option<String>,
    /// Comma-separated result-type tags aligned with `result_ids`.
    #[serde(rename = "resultTypes", default)]
    pub result_types: Option<String>,
    #[serde(rename = "queryResultFormat", default)]
    pub query_result_format: Option<String>,
}

/// Envelope of every REST response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecResponse {
    #[serde(rename = "data", alias = "Data", default)]
    pub data: ExecResponseData,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub success: bool,
}

impl ExecResponse {
    /// Whether the response carries an in-progress code: the bounded
    /// synchronous wait elapsed and the result must be polled by URL.
    pub fn is_query_in_progress(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some(QUERY_IN_PROGRESS_CODE) | Some(QUERY_IN_PROGRESS_ASYNC_CODE)
        )
    }
}

/// One status record from the monitoring endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    #[serde(default)]
    pub status: String,
    #[serde(rename = "sqlText", default)]
    pub sql_text: String,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub stats: StatusStats,
}

/// Usage statistics attached to a status record.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusStats {
    #[serde(default)]
    pub scan_bytes: i64,
    #[serde(default)]
    pub produced_rows: i64,
}

/// Envelope of the monitoring endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub data: StatusResponseData,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponseData {
    #[serde(default)]
    pub queries: Vec<StatusRecord>,
}
