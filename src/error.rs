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

//! Error taxonomy for the driver.
//!
//! Every variant carries owned data so errors are `Clone`: a chunk downloader
//! that enters its terminal state keeps the error and returns a copy from
//! every subsequent `next_row()` call.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the driver.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A wire-format cell could not be converted to its declared logical type.
    /// Fatal to the query at the failing row; never retried.
    #[error("cannot convert {raw:?} to {column_type}: {reason}")]
    ValueConversion {
        raw: String,
        column_type: String,
        reason: String,
    },

    /// A remote chunk fetch failed (transport or non-success HTTP status).
    /// Retried at chunk granularity up to the downloader's error budget.
    #[error("chunk fetch failed{}: {message}", status_suffix(.status))]
    ChunkFetch {
        status: Option<u16>,
        message: String,
    },

    /// The server response is structurally inconsistent with the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server reported a terminal query failure.
    #[error("query {query_id} failed with code {code}: {message}")]
    QueryStatus {
        code: String,
        message: String,
        query_id: String,
    },

    /// The caller aborted the operation. Not a failure of the system;
    /// propagated immediately without retry.
    #[error("operation cancelled")]
    Cancelled,

    /// An API was used outside its legal state sequence.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Transport-level failure talking to the warehouse REST endpoints.
    #[error("http error: {0}")]
    Http(String),

    /// A response body or payload could not be decoded
    /// (JSON, Arrow IPC, base64, hex, or gzip).
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    pub(crate) fn conversion(
        raw: impl Into<String>,
        column_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::ValueConversion {
            raw: raw.into(),
            column_type: column_type.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn chunk_fetch(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::ChunkFetch {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Error::ProtocolViolation(message.into())
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    pub(crate) fn http(message: impl Into<String>) -> Self {
        Error::Http(message.into())
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Error::Decode(message.into())
    }

    /// Whether a failed chunk fetch may be re-dispatched.
    ///
    /// Only transport-shaped failures count; malformed payloads and
    /// cancellation are terminal.
    pub(crate) fn is_retryable_fetch(&self) -> bool {
        matches!(self, Error::ChunkFetch { .. } | Error::Http(_))
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_fetch_error_includes_status() {
        let err = Error::chunk_fetch(Some(403), "Forbidden");
        assert_eq!(err.to_string(), "chunk fetch failed (HTTP 403): Forbidden");

        let err = Error::chunk_fetch(None, "connection reset");
        assert_eq!(err.to_string(), "chunk fetch failed: connection reset");
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::chunk_fetch(Some(500), "boom").is_retryable_fetch());
        assert!(Error::http("timed out").is_retryable_fetch());
        assert!(!Error::Cancelled.is_retryable_fetch());
        assert!(!Error::decode("bad arrow stream").is_retryable_fetch());
        assert!(!Error::conversion("abc", "fixed", "invalid digit").is_retryable_fetch());
    }

    #[test]
    fn errors_are_cloneable() {
        let err = Error::QueryStatus {
            code: "000605".into(),
            message: "aborted".into(),
            query_id: "01b2-aaaa".into(),
        };
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
