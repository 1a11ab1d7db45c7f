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

//! Chunk downloader: the concurrency core of result streaming.
//!
//! One downloader owns a result set's inline first chunk plus its remote
//! chunk descriptors. `start()` launches a scheduler task and a bounded
//! worker pool; `next_row()` pulls rows in strict chunk-index order.
//!
//! ## Pipeline
//!
//! ```text
//! [Scheduler] --(slot, bounded)--> [Consumer next_row()]
//!      |
//!      +------(task, unbounded)--> [Fetch workers] --oneshot--> slot
//! ```
//!
//! The scheduler sends each chunk's slot to the bounded slot channel BEFORE
//! enqueueing its fetch task, so the consumer receives slots in chunk-index
//! order no matter how fetches complete. The slot channel's capacity is the
//! prefetch window: when the consumer falls behind, the scheduler blocks and
//! no further fetch tasks become visible to the workers, bounding both
//! in-flight fetches and resident chunks.

use crate::error::{Error, Result};
use crate::reader::codec;
use crate::reader::fetcher::ChunkFetch;
use crate::reader::pipeline::{chunk_slot_pair, ChunkSlot};
use crate::reader::workers::spawn_fetch_workers;
use crate::reader::{ChunkDescriptor, DecodedChunk, RawRow, Row};
use crate::types::options::{DownloaderConfig, QueryOptions};
use crate::types::wire::{ExecResponseData, ResultFormat, RowType};
use crate::value::arrow::decode_batch_rows;
use arrow_array::RecordBatch;
use std::collections::VecDeque;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle states of a downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloaderState {
    Idle,
    Downloading,
    Exhausted,
    Errored,
}

/// Streams one result set's rows in order while prefetching remote chunks.
pub struct ChunkDownloader {
    row_type: Arc<Vec<RowType>>,
    options: QueryOptions,
    config: DownloaderConfig,
    format: ResultFormat,
    total_rows: i64,

    state: DownloaderState,
    current_rows: VecDeque<RawRow>,
    /// Inline batches held back for arrow-batches mode.
    inline_batches: Vec<RecordBatch>,

    pending: Vec<ChunkDescriptor>,
    slot_rx: Option<mpsc::Receiver<ChunkSlot>>,
    fetcher: Arc<dyn ChunkFetch>,
    cancel: CancellationToken,
    terminal_error: Option<Error>,
    chunks_consumed: usize,
}

impl std::fmt::Debug for ChunkDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkDownloader")
            .field("state", &self.state)
            .field("total_rows", &self.total_rows)
            .field("buffered_rows", &self.current_rows.len())
            .field("pending_chunks", &self.pending.len())
            .field("chunks_consumed", &self.chunks_consumed)
            .finish()
    }
}

impl ChunkDownloader {
    /// Build a downloader from a result response's data section.
    ///
    /// The inline first chunk is decoded eagerly; remote chunks become
    /// descriptors fetched after `start()`.
    pub fn new(
        data: &ExecResponseData,
        fetcher: Arc<dyn ChunkFetch>,
        config: DownloaderConfig,
        options: QueryOptions,
        parent_cancel: &CancellationToken,
    ) -> Result<Self> {
        let format = ResultFormat::from_tag(data.query_result_format.as_deref());
        let row_type = Arc::new(data.row_type.clone());

        let mut inline_rows = VecDeque::new();
        let mut inline_batches = Vec::new();
        match format {
            ResultFormat::Json => {
                inline_rows.extend(data.row_set.iter().cloned().map(RawRow::Text));
            }
            ResultFormat::Arrow => {
                if !data.row_set_base64.is_empty() {
                    let batches = codec::parse_inline_arrow_base64(&data.row_set_base64)?;
                    if options.arrow_batches {
                        inline_batches = batches;
                    } else {
                        for batch in &batches {
                            inline_rows.extend(
                                decode_batch_rows(batch, &row_type, &options)?
                                    .into_iter()
                                    .map(RawRow::Typed),
                            );
                        }
                    }
                }
            }
        }

        Ok(Self {
            row_type,
            options,
            config,
            format,
            total_rows: data.total,
            state: DownloaderState::Idle,
            current_rows: inline_rows,
            inline_batches,
            pending: ChunkDescriptor::from_response(data),
            slot_rx: None,
            fetcher,
            cancel: parent_cancel.child_token(),
            terminal_error: None,
            chunks_consumed: 0,
        })
    }

    /// Test-visible constructor from already-decoded parts.
    #[cfg(test)]
    pub(crate) fn from_parts(
        row_type: Vec<RowType>,
        inline_rows: Vec<RawRow>,
        pending: Vec<ChunkDescriptor>,
        fetcher: Arc<dyn ChunkFetch>,
        config: DownloaderConfig,
        options: QueryOptions,
        parent_cancel: &CancellationToken,
    ) -> Self {
        Self {
            row_type: Arc::new(row_type),
            options,
            config,
            format: ResultFormat::Json,
            total_rows: 0,
            state: DownloaderState::Idle,
            current_rows: inline_rows.into(),
            inline_batches: Vec::new(),
            pending,
            slot_rx: None,
            fetcher,
            cancel: parent_cancel.child_token(),
            terminal_error: None,
            chunks_consumed: 0,
        }
    }

    /// Launch background fetching. Legal exactly once, from `Idle`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != DownloaderState::Idle {
            return Err(Error::invalid_state(format!(
                "start() called in {:?} state",
                self.state
            )));
        }
        self.state = DownloaderState::Downloading;

        let descriptors = std::mem::take(&mut self.pending);
        if descriptors.is_empty() {
            return Ok(());
        }

        let window = self.config.prefetch_window.max(1);
        let worker_count = self.config.max_download_workers.max(1).min(descriptors.len());
        let (slot_tx, slot_rx) = mpsc::channel::<ChunkSlot>(window);
        let (task_tx, task_rx) = mpsc::unbounded_channel();

        debug!(
            "starting downloader: {} remote chunks, {} workers, window {}",
            descriptors.len(),
            worker_count,
            window
        );

        let cancel = self.cancel.clone();
        // tasks detach; the cancellation token governs their shutdown
        tokio::spawn(async move {
            for (index, descriptor) in descriptors.into_iter().enumerate() {
                let (task, slot) = chunk_slot_pair(index, descriptor);
                // Slot first: this keeps delivery in chunk-index order and
                // makes the bounded channel the backpressure point.
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = slot_tx.send(slot) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
                if task_tx.send(task).is_err() {
                    return;
                }
            }
        });

        spawn_fetch_workers(
            task_rx,
            worker_count,
            Arc::clone(&self.fetcher),
            self.config.clone(),
            Arc::new(AtomicU32::new(0)),
            self.cancel.clone(),
        );
        self.slot_rx = Some(slot_rx);
        Ok(())
    }

    /// Deliver the next row, blocking only when the next chunk is not ready.
    ///
    /// Returns `Ok(None)` at end of data; the terminal states are sticky.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.options.arrow_batches {
            return Err(Error::invalid_state(
                "result set is in arrow-batches mode; use take_batches()",
            ));
        }

        loop {
            match self.state {
                DownloaderState::Idle => {
                    return Err(Error::invalid_state("next_row() before start()"))
                }
                DownloaderState::Errored => {
                    return Err(self
                        .terminal_error
                        .clone()
                        .unwrap_or(Error::invalid_state("downloader failed")));
                }
                DownloaderState::Exhausted => return Ok(None),
                DownloaderState::Downloading => {}
            }

            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if let Some(raw) = self.current_rows.pop_front() {
                return Row::from_raw(raw, &self.row_type, &self.options).map(Some);
            }

            match self.wait_next_chunk().await? {
                Some(DecodedChunk::Rows(rows)) => {
                    self.chunks_consumed += 1;
                    self.current_rows = rows.into();
                    // empty chunks loop to the next one
                }
                Some(DecodedChunk::Batches(_)) => {
                    return Err(Error::invalid_state(
                        "received raw batches outside arrow-batches mode",
                    ));
                }
                None => {
                    self.state = DownloaderState::Exhausted;
                    return Ok(None);
                }
            }
        }
    }

    /// Drain the whole result set as raw columnar batches, in chunk order.
    /// Only legal in arrow-batches mode, after `start()`.
    pub async fn take_batches(&mut self) -> Result<Vec<RecordBatch>> {
        if !self.options.arrow_batches {
            return Err(Error::invalid_state(
                "take_batches() requires arrow-batches mode",
            ));
        }
        match self.state {
            DownloaderState::Idle => {
                return Err(Error::invalid_state("take_batches() before start()"))
            }
            DownloaderState::Errored => {
                return Err(self
                    .terminal_error
                    .clone()
                    .unwrap_or(Error::invalid_state("downloader failed")));
            }
            DownloaderState::Exhausted => return Ok(Vec::new()),
            DownloaderState::Downloading => {}
        }

        let mut out = std::mem::take(&mut self.inline_batches);
        loop {
            match self.wait_next_chunk().await? {
                Some(DecodedChunk::Batches(batches)) => {
                    self.chunks_consumed += 1;
                    out.extend(batches);
                }
                Some(DecodedChunk::Rows(rows)) if rows.is_empty() => {
                    self.chunks_consumed += 1;
                }
                Some(DecodedChunk::Rows(_)) => {
                    return Err(Error::invalid_state(
                        "received decoded rows in arrow-batches mode",
                    ));
                }
                None => {
                    self.state = DownloaderState::Exhausted;
                    return Ok(out);
                }
            }
        }
    }

    /// Await the next chunk slot in index order. `Ok(None)` means every chunk
    /// has been delivered.
    async fn wait_next_chunk(&mut self) -> Result<Option<DecodedChunk>> {
        let Some(slot_rx) = self.slot_rx.as_mut() else {
            return Ok(None);
        };

        let slot = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            slot = slot_rx.recv() => slot,
        };

        let Some(slot) = slot else {
            // scheduler finished and every slot has been consumed
            self.slot_rx = None;
            return Ok(None);
        };

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            result = slot.result_rx => result,
        };

        match result {
            Ok(Ok(chunk)) => Ok(Some(chunk)),
            Ok(Err(e)) => {
                debug!("chunk {} failed terminally: {e}", slot.chunk_index);
                self.state = DownloaderState::Errored;
                self.terminal_error = Some(e.clone());
                Err(e)
            }
            // the worker vanished without sending; only happens on teardown
            Err(_) => Err(Error::Cancelled),
        }
    }

    /// Column metadata shared by every row of this result set.
    pub fn row_type(&self) -> &[RowType] {
        &self.row_type
    }

    /// Total row count declared by the server.
    pub fn total_rows(&self) -> i64 {
        self.total_rows
    }

    /// Result encoding of this result set.
    pub fn format(&self) -> ResultFormat {
        self.format
    }

    pub fn state(&self) -> DownloaderState {
        self.state
    }

    /// Number of remote chunks fully received by the consumer.
    pub fn chunks_consumed(&self) -> usize {
        self.chunks_consumed
    }

    /// Abort background fetching; results of in-flight fetches are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ChunkDownloader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
