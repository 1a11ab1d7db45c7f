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

//! Async driver for the Snowflake REST/JSON and Arrow result protocol.
//!
//! The driver translates SQL execution requests into HTTP calls, manages
//! asynchronous query lifecycles, and streams large result sets without
//! loading them entirely into memory: remote chunks are prefetched by a
//! bounded worker pool while the consumer pulls rows in strict order.
//!
//! ## Overview
//!
//! - [`Connection`] — query submission, status polling, result fetch by id
//! - [`QueryResult`] — sequential row pull over one or more result sets
//! - [`TypedValue`] — decoded cell values, identical for both row encodings
//!
//! ## Example
//!
//! ```ignore
//! use snowflake_driver::{Connection, HttpClient, HttpClientConfig, RestApiClient};
//! use snowflake_driver::{DriverConfig, QueryOptions};
//! use std::sync::Arc;
//!
//! let http = Arc::new(HttpClient::new(HttpClientConfig::default())?);
//! let api = Arc::new(RestApiClient::new(
//!     Arc::clone(&http),
//!     "https://account.snowflakecomputing.com",
//!     Some(session_token),
//! ));
//! let conn = Connection::new(api, http, DriverConfig::default());
//!
//! let mut result = conn.query("SELECT * FROM big_table", QueryOptions::default()).await?;
//! while let Some(row) = result.next_row().await? {
//!     // values arrive in chunk order, prefetched in the background
//! }
//! ```
//!
//! ## Options
//!
//! | Option | Effect |
//! |--------|--------|
//! | `async_mode` | submit asynchronously, poll by query id |
//! | `higher_precision` | arbitrary-precision decimals instead of floats |
//! | `arrow_batches` | raw columnar batches instead of a row iterator |
//! | `original_timestamp` | skip session-timezone normalization |

pub mod client;
pub mod connection;
pub mod error;
pub mod logging;
pub mod query;
pub mod reader;
pub mod types;
pub mod value;

pub use client::{HttpClient, HttpClientConfig, RestApiClient, WarehouseApi};
pub use connection::{Connection, ExecOutcome};
pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig};
pub use query::{AsyncSubmission, QueryCompletion, QueryResult, QueryStatusKind};
pub use reader::{ChunkDescriptor, ChunkDownloader, ChunkFetch, ResultSetChain, Row};
pub use types::{DownloaderConfig, DriverConfig, QueryOptions};
pub use value::TypedValue;
