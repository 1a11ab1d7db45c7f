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

//! Remote chunk fetching.
//!
//! One GET per chunk descriptor, carrying the descriptor's identity or
//! decryption headers. The body is read in full inside the fetch call so the
//! HTTP response is always released, then sniffed for gzip and decoded into
//! the same [`DecodedChunk`] shape as the inline first chunk.

use crate::client::http::HttpClient;
use crate::error::{Error, Result};
use crate::reader::{codec, ChunkDescriptor, DecodedChunk, RawRow};
use crate::types::options::QueryOptions;
use crate::types::wire::{ResultFormat, RowType};
use crate::value::arrow::decode_batch_rows;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Longest error-body excerpt included in a fetch error.
const ERROR_BODY_EXCERPT_LIMIT: usize = 512;

/// Fetches and decodes one remote chunk.
#[async_trait]
pub trait ChunkFetch: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, descriptor: &ChunkDescriptor) -> Result<DecodedChunk>;
}

/// HTTP implementation of [`ChunkFetch`].
#[derive(Debug)]
pub struct HttpChunkFetcher {
    http: Arc<HttpClient>,
    format: ResultFormat,
    row_type: Arc<Vec<RowType>>,
    options: QueryOptions,
}

impl HttpChunkFetcher {
    pub fn new(
        http: Arc<HttpClient>,
        format: ResultFormat,
        row_type: Arc<Vec<RowType>>,
        options: QueryOptions,
    ) -> Self {
        Self {
            http,
            format,
            row_type,
            options,
        }
    }

    /// Decode a chunk body into rows or raw batches, shared with tests.
    fn decode_body(&self, bytes: Vec<u8>) -> Result<DecodedChunk> {
        let bytes = codec::decompress_if_gzip(bytes)?;
        match self.format {
            ResultFormat::Json => {
                let rows = codec::parse_json_rows(&bytes)?
                    .into_iter()
                    .map(RawRow::Text)
                    .collect();
                Ok(DecodedChunk::Rows(rows))
            }
            ResultFormat::Arrow => {
                let batches = codec::parse_arrow_stream(&bytes)?;
                if self.options.arrow_batches {
                    return Ok(DecodedChunk::Batches(batches));
                }
                let mut rows = Vec::new();
                for batch in &batches {
                    rows.extend(
                        decode_batch_rows(batch, &self.row_type, &self.options)?
                            .into_iter()
                            .map(RawRow::Typed),
                    );
                }
                Ok(DecodedChunk::Rows(rows))
            }
        }
    }
}

#[async_trait]
impl ChunkFetch for HttpChunkFetcher {
    async fn fetch(&self, descriptor: &ChunkDescriptor) -> Result<DecodedChunk> {
        let start = Instant::now();

        let mut request = self.http.inner().get(&descriptor.url);
        for (name, value) in &descriptor.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::chunk_fetch(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT_LIMIT).collect();
            return Err(Error::chunk_fetch(Some(status.as_u16()), excerpt));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::chunk_fetch(None, format!("failed to read chunk body: {e}")))?;

        debug!(
            "fetched chunk from {}: {} bytes in {:?}",
            descriptor.url,
            bytes.len(),
            start.elapsed()
        );

        let chunk = self.decode_body(bytes.to_vec())?;
        if chunk.row_count() as i64 != descriptor.row_count {
            debug!(
                "chunk row count {} differs from descriptor {}",
                chunk.row_count(),
                descriptor.row_count
            );
        }
        Ok(chunk)
    }
}
