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

//! Download workers for the chunk pipeline.
//!
//! Long-lived tasks pull [`ChunkFetchTask`]s from a shared queue, perform the
//! fetch with retry, and send the result through the task's single-fire slot.
//! The claim step (queue receive) guarantees each chunk index is owned by
//! exactly one worker.
//!
//! Retry policy: transport-shaped failures are re-dispatched for the same
//! chunk after a delay, drawing on an error budget shared by the whole
//! downloader. When the budget is exhausted the failing chunk's slot receives
//! the terminal error. Decode failures and cancellation are never retried.

use crate::error::{Error, Result};
use crate::reader::fetcher::ChunkFetch;
use crate::reader::pipeline::ChunkFetchTask;
use crate::reader::DecodedChunk;
use crate::types::options::DownloaderConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Spawn `count` workers sharing one task queue.
pub(crate) fn spawn_fetch_workers(
    task_rx: mpsc::UnboundedReceiver<ChunkFetchTask>,
    count: usize,
    fetcher: Arc<dyn ChunkFetch>,
    config: DownloaderConfig,
    error_budget: Arc<AtomicU32>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let task_rx = Arc::new(Mutex::new(task_rx));
    debug!(
        "spawning {count} fetch workers (error budget {})",
        config.max_error_retries
    );

    (0..count)
        .map(|worker_id| {
            let rx = Arc::clone(&task_rx);
            let fetcher = Arc::clone(&fetcher);
            let config = config.clone();
            let budget = Arc::clone(&error_budget);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                worker_task(worker_id, rx, fetcher, config, budget, cancel).await;
            })
        })
        .collect()
}

async fn worker_task(
    worker_id: usize,
    task_rx: Arc<Mutex<mpsc::UnboundedReceiver<ChunkFetchTask>>>,
    fetcher: Arc<dyn ChunkFetch>,
    config: DownloaderConfig,
    error_budget: Arc<AtomicU32>,
    cancel: CancellationToken,
) {
    loop {
        let task = {
            let mut rx = task_rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("worker {worker_id} cancelled while waiting for a task");
                    return;
                }
                task = rx.recv() => task,
            }
        };

        let Some(task) = task else {
            debug!("worker {worker_id} exiting: task queue closed");
            return;
        };

        trace!("worker {worker_id} claimed chunk {}", task.chunk_index);
        let result = fetch_with_retry(
            worker_id,
            task.chunk_index,
            &task.descriptor,
            fetcher.as_ref(),
            &config,
            &error_budget,
            &cancel,
        )
        .await;

        // The receiver may be gone if the downloader was abandoned; the
        // result is simply discarded then.
        if task.result_tx.send(result).is_err() {
            debug!(
                "worker {worker_id}: slot reader dropped for chunk {}",
                task.chunk_index
            );
        }
    }
}

async fn fetch_with_retry(
    worker_id: usize,
    chunk_index: usize,
    descriptor: &crate::reader::ChunkDescriptor,
    fetcher: &dyn ChunkFetch,
    config: &DownloaderConfig,
    error_budget: &AtomicU32,
    cancel: &CancellationToken,
) -> Result<DecodedChunk> {
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match fetcher.fetch(descriptor).await {
            Ok(chunk) => return Ok(chunk),
            Err(e) if e.is_retryable_fetch() => {
                let failures = error_budget.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= config.max_error_retries {
                    warn!(
                        "worker {worker_id}: chunk {chunk_index} failed and the error budget \
                         ({}) is exhausted: {e}",
                        config.max_error_retries
                    );
                    return Err(e);
                }
                warn!(
                    "worker {worker_id}: chunk {chunk_index} fetch failed \
                     ({failures}/{}), retrying: {e}",
                    config.max_error_retries
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(config.retry_delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::pipeline::chunk_slot_pair;
    use crate::reader::{ChunkDescriptor, RawRow};
    use crate::value::TypedValue;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn descriptor(index: usize) -> ChunkDescriptor {
        ChunkDescriptor {
            url: format!("https://stage.example.com/chunk{index}"),
            row_count: 1,
            uncompressed_size: 16,
            compressed_size: 8,
            headers: HashMap::new(),
        }
    }

    fn config(max_error_retries: u32) -> DownloaderConfig {
        DownloaderConfig {
            max_error_retries,
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    /// Fails the first `failures` fetches with a retryable error.
    #[derive(Debug)]
    struct FlakyFetcher {
        remaining_failures: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl FlakyFetcher {
        fn new(failures: usize) -> Self {
            Self {
                remaining_failures: AtomicUsize::new(failures),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChunkFetch for FlakyFetcher {
        async fn fetch(&self, _descriptor: &ChunkDescriptor) -> Result<DecodedChunk> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            let before = self.remaining_failures.load(Ordering::Relaxed);
            if before > 0 {
                self.remaining_failures.store(before - 1, Ordering::Relaxed);
                return Err(Error::chunk_fetch(Some(503), "unavailable"));
            }
            Ok(DecodedChunk::Rows(vec![RawRow::Typed(vec![
                TypedValue::Int(9),
            ])]))
        }
    }

    /// Fails every fetch with a non-retryable decode error.
    #[derive(Debug)]
    struct CorruptFetcher;

    #[async_trait]
    impl ChunkFetch for CorruptFetcher {
        async fn fetch(&self, _descriptor: &ChunkDescriptor) -> Result<DecodedChunk> {
            Err(Error::decode("corrupt chunk"))
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let fetcher = Arc::new(FlakyFetcher::new(2));
        let budget = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (task, slot) = chunk_slot_pair(0, descriptor(0));
        task_tx.send(task).unwrap();
        drop(task_tx);

        let handles = spawn_fetch_workers(
            task_rx,
            1,
            fetcher.clone(),
            config(5),
            budget.clone(),
            cancel,
        );

        let result = slot.result_rx.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(fetcher.attempts.load(Ordering::Relaxed), 3);
        assert_eq!(budget.load(Ordering::Relaxed), 2);
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_terminal_error() {
        let fetcher = Arc::new(FlakyFetcher::new(usize::MAX));
        let budget = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (task, slot) = chunk_slot_pair(0, descriptor(0));
        task_tx.send(task).unwrap();
        drop(task_tx);

        let _handles = spawn_fetch_workers(task_rx, 1, fetcher.clone(), config(3), budget, cancel);

        let result = slot.result_rx.await.unwrap();
        assert!(matches!(result, Err(Error::ChunkFetch { .. })));
        // budget of 3: three failed attempts, no fourth
        assert_eq!(fetcher.attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn decode_errors_are_not_retried() {
        let budget = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (task, slot) = chunk_slot_pair(0, descriptor(0));
        task_tx.send(task).unwrap();
        drop(task_tx);

        let _handles = spawn_fetch_workers(
            task_rx,
            1,
            Arc::new(CorruptFetcher),
            config(5),
            budget.clone(),
            cancel,
        );

        let result = slot.result_rx.await.unwrap();
        assert!(matches!(result, Err(Error::Decode(_))));
        assert_eq!(budget.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn workers_exit_on_cancellation() {
        let cancel = CancellationToken::new();
        let (_task_tx, task_rx) = mpsc::unbounded_channel::<ChunkFetchTask>();

        let handles = spawn_fetch_workers(
            task_rx,
            2,
            Arc::new(CorruptFetcher),
            config(5),
            Arc::new(AtomicU32::new(0)),
            cancel.clone(),
        );

        cancel.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("worker should exit promptly")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn error_budget_is_shared_across_workers() {
        // Two chunks, each failing twice, against a budget of 3: the shared
        // counter reaches 4 and exactly one chunk ends in a terminal error.
        let fetcher = Arc::new(FlakyFetcher::new(4));
        let budget = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (task0, slot0) = chunk_slot_pair(0, descriptor(0));
        let (task1, slot1) = chunk_slot_pair(1, descriptor(1));
        task_tx.send(task0).unwrap();
        task_tx.send(task1).unwrap();
        drop(task_tx);

        let _handles =
            spawn_fetch_workers(task_rx, 1, fetcher, config(3), budget.clone(), cancel);

        let first = slot0.result_rx.await.unwrap();
        let second = slot1.result_rx.await.unwrap();
        assert!(
            first.is_err() || second.is_err(),
            "shared budget should fail at least one chunk"
        );
    }
}
