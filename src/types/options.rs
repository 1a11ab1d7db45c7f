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

//! Request options and downloader configuration.
//!
//! Both structs are passed explicitly through the call chain. There are no
//! process-wide tunables: every downloader gets its own [`DownloaderConfig`]
//! and every query its own [`QueryOptions`].

use chrono::FixedOffset;
use std::time::Duration;

/// Per-query decoding and execution options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Submit the query asynchronously and suppress the inline result fetch.
    pub async_mode: bool,
    /// Decode scaled and oversized numerics as arbitrary-precision decimals
    /// instead of native floats, preserving full precision.
    pub higher_precision: bool,
    /// Deliver raw columnar record batches instead of a row iterator.
    /// Only meaningful for arrow-format results.
    pub arrow_batches: bool,
    /// Skip timestamp normalization to the session timezone; local-timezone
    /// timestamps are delivered in UTC as stored.
    pub original_timestamp: bool,
    /// Session timezone applied to `timestamp_ltz` values.
    pub timezone: Option<FixedOffset>,
}

/// Configuration for one chunk downloader.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Maximum number of concurrent chunk fetch workers.
    pub max_download_workers: usize,
    /// Total failed fetch attempts tolerated across the whole downloader
    /// before it enters its terminal error state.
    pub max_error_retries: u32,
    /// Number of chunks that may be prefetched (in flight or decoded but not
    /// yet consumed). Bounds memory to O(window x chunk size).
    pub prefetch_window: usize,
    /// Delay before re-dispatching a failed chunk fetch.
    pub retry_delay: Duration,
    /// Timeout applied to each chunk fetch request.
    pub request_timeout: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_download_workers: 10,
            max_error_retries: 5,
            prefetch_window: 16,
            retry_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Connection-level configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Downloader settings applied to every result set.
    pub downloader: DownloaderConfig,
    /// Interval between status polls for asynchronous queries.
    pub poll_interval: Duration,
    /// Timeout for REST calls to the warehouse endpoints.
    pub request_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            downloader: DownloaderConfig::default(),
            poll_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(60),
        }
    }
}
