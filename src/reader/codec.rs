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

//! Chunk payload decoding.
//!
//! Remote chunk bodies arrive in one of two shapes: a (possibly
//! gzip-compressed) JSON fragment of rows without the enclosing array
//! brackets, or an Arrow IPC stream. The inline first chunk of an
//! arrow-format result is the same IPC stream, base64-encoded in the
//! response JSON. Compression is detected by sniffing the gzip magic bytes
//! rather than trusting a content-encoding header.

use crate::error::{Error, Result};
use arrow_array::RecordBatch;
use arrow_ipc::reader::StreamReader;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompress a payload when it carries the gzip magic bytes; pass anything
/// else through untouched.
pub(crate) fn decompress_if_gzip(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if bytes.len() < 2 || bytes[..2] != GZIP_MAGIC {
        return Ok(bytes);
    }
    let mut decoder = GzDecoder::new(Cursor::new(bytes));
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::decode(format!("gzip decompression failed: {e}")))?;
    Ok(out)
}

/// Parse a JSON chunk body into rows of nullable strings.
///
/// Chunk bodies are row fragments (`["1"],["2"]`); the enclosing brackets
/// are added here before parsing.
pub(crate) fn parse_json_rows(bytes: &[u8]) -> Result<Vec<Vec<Option<String>>>> {
    let mut wrapped = Vec::with_capacity(bytes.len() + 2);
    wrapped.push(b'[');
    wrapped.extend_from_slice(bytes);
    wrapped.push(b']');
    serde_json::from_slice(&wrapped)
        .map_err(|e| Error::decode(format!("malformed JSON chunk body: {e}")))
}

/// Parse an Arrow IPC stream into record batches.
pub(crate) fn parse_arrow_stream(bytes: &[u8]) -> Result<Vec<RecordBatch>> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)
        .map_err(|e| Error::decode(format!("invalid Arrow IPC stream: {e}")))?;
    reader
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::decode(format!("failed to read Arrow batches: {e}")))
}

/// Decode the base64-encoded inline rowset through the same IPC path as
/// remote arrow chunks.
pub(crate) fn parse_inline_arrow_base64(encoded: &str) -> Result<Vec<RecordBatch>> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| Error::decode(format!("invalid base64 inline rowset: {e}")))?;
    parse_arrow_stream(&bytes)
}
