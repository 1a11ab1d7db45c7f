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

//! Result-set retrieval and chunked streaming.
//!
//! This module turns a server response describing a query result (inline
//! rows plus remotely stored chunks) into a sequential, type-converted row
//! iterator:
//! - `codec`: payload decoding (gzip sniffing, JSON fragments, Arrow IPC)
//! - `fetcher`: fetches and decodes one remote chunk
//! - `pipeline`: per-chunk single-fire result slots
//! - `workers`: the bounded fetch worker pool
//! - `downloader`: ordering, backpressure, and the `next_row` interface
//! - `chain`: multi-statement result-set navigation

pub mod chain;
pub mod codec;
pub mod downloader;
pub mod fetcher;
pub(crate) mod pipeline;
pub(crate) mod workers;

use crate::error::{Error, Result};
use crate::types::options::QueryOptions;
use crate::types::wire::{ExecResponseChunk, ExecResponseData, RowType};
use crate::value::{text::decode_text, TypedValue};
use arrow_array::RecordBatch;
use std::collections::HashMap;

pub use chain::ResultSetChain;
pub use downloader::{ChunkDownloader, DownloaderState};
pub use fetcher::{ChunkFetch, HttpChunkFetcher};

/// SSE-C headers attached to chunk fetches when the response supplies a
/// symmetric decryption key instead of an explicit header map.
const HEADER_SSE_C_ALGORITHM: &str = "x-amz-server-side-encryption-customer-algorithm";
const HEADER_SSE_C_KEY: &str = "x-amz-server-side-encryption-customer-key";
const SSE_C_AES: &str = "AES256";

/// Location and fetch parameters of one remote chunk. Immutable; consumed
/// exactly once by a fetch operation.
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    pub url: String,
    pub row_count: i64,
    pub uncompressed_size: i64,
    pub compressed_size: i64,
    /// Headers to send with the fetch: either the server-supplied map or the
    /// SSE-C pair derived from the symmetric key.
    pub headers: HashMap<String, String>,
}

impl ChunkDescriptor {
    /// Build descriptors for every remote chunk of a result set, resolving
    /// the per-chunk headers once.
    pub(crate) fn from_response(data: &ExecResponseData) -> Vec<ChunkDescriptor> {
        let headers = if !data.chunk_headers.is_empty() {
            data.chunk_headers.clone()
        } else if !data.qrmk.is_empty() {
            HashMap::from([
                (HEADER_SSE_C_ALGORITHM.to_string(), SSE_C_AES.to_string()),
                (HEADER_SSE_C_KEY.to_string(), data.qrmk.clone()),
            ])
        } else {
            HashMap::new()
        };

        data.chunks
            .iter()
            .map(|chunk: &ExecResponseChunk| ChunkDescriptor {
                url: chunk.url.clone(),
                row_count: chunk.row_count,
                uncompressed_size: chunk.uncompressed_size,
                compressed_size: chunk.compressed_size,
                headers: headers.clone(),
            })
            .collect()
    }
}

/// A decoded row before final type conversion. Textual rows carry raw cells
/// converted at delivery time; columnar rows are already typed.
#[derive(Debug, Clone)]
pub enum RawRow {
    Text(Vec<Option<String>>),
    Typed(Vec<TypedValue>),
}

/// One fetched and decoded chunk, held by the downloader until consumed.
#[derive(Debug)]
pub enum DecodedChunk {
    Rows(Vec<RawRow>),
    /// Raw columnar batches; produced only in arrow-batches mode.
    Batches(Vec<RecordBatch>),
}

impl DecodedChunk {
    pub(crate) fn row_count(&self) -> usize {
        match self {
            DecodedChunk::Rows(rows) => rows.len(),
            DecodedChunk::Batches(batches) => batches.iter().map(|b| b.num_rows()).sum(),
        }
    }
}

/// One delivered result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<TypedValue>,
}

impl Row {
    pub(crate) fn from_raw(
        raw: RawRow,
        row_type: &[RowType],
        options: &QueryOptions,
    ) -> Result<Row> {
        let values = match raw {
            RawRow::Typed(values) => values,
            RawRow::Text(cells) => {
                if cells.len() != row_type.len() {
                    return Err(Error::protocol(format!(
                        "row has {} cells but the result set declares {} columns",
                        cells.len(),
                        row_type.len()
                    )));
                }
                let mut values = Vec::with_capacity(cells.len());
                for (cell, meta) in cells.iter().zip(row_type) {
                    values.push(decode_text(cell.as_deref(), meta, options)?);
                }
                values
            }
        };
        Ok(Row { values })
    }

    /// Cell value at the given column position.
    pub fn get(&self, index: usize) -> Option<&TypedValue> {
        self.values.get(index)
    }

    /// All cell values in column order.
    pub fn values(&self) -> &[TypedValue] {
        &self.values
    }

    /// Consume the row, yielding its values.
    pub fn into_values(self) -> Vec<TypedValue> {
        self.values
    }
}
