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

//! Per-chunk result slots for the download pipeline.
//!
//! Each chunk gets a connected `(ChunkFetchTask, ChunkSlot)` pair built on a
//! oneshot channel: the worker that claims the task is the slot's single
//! writer, the consumer is its single reader. Slots are handed to the
//! consumer in chunk-index order, so delivery order is independent of fetch
//! completion order.

use crate::error::Result;
use crate::reader::{ChunkDescriptor, DecodedChunk};
use tokio::sync::oneshot;

/// A fetch task owned by exactly one download worker.
#[derive(Debug)]
pub(crate) struct ChunkFetchTask {
    /// Index of this chunk in the result set.
    pub chunk_index: usize,
    pub descriptor: ChunkDescriptor,
    /// Single-fire writer side of the slot; consumed when the result is sent.
    pub result_tx: oneshot::Sender<Result<DecodedChunk>>,
}

/// The consumer's handle for one chunk, awaited in chunk-index order.
#[derive(Debug)]
pub(crate) struct ChunkSlot {
    pub chunk_index: usize,
    pub result_rx: oneshot::Receiver<Result<DecodedChunk>>,
}

/// Create a connected task/slot pair for the given chunk index.
pub(crate) fn chunk_slot_pair(
    chunk_index: usize,
    descriptor: ChunkDescriptor,
) -> (ChunkFetchTask, ChunkSlot) {
    let (result_tx, result_rx) = oneshot::channel();
    (
        ChunkFetchTask {
            chunk_index,
            descriptor,
            result_tx,
        },
        ChunkSlot {
            chunk_index,
            result_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::reader::RawRow;
    use crate::value::TypedValue;
    use std::collections::HashMap;

    fn descriptor(index: usize) -> ChunkDescriptor {
        ChunkDescriptor {
            url: format!("https://stage.example.com/chunk{index}"),
            row_count: 1,
            uncompressed_size: 16,
            compressed_size: 8,
            headers: HashMap::new(),
        }
    }

    #[test]
    fn pair_shares_chunk_index() {
        let (task, slot) = chunk_slot_pair(3, descriptor(3));
        assert_eq!(task.chunk_index, 3);
        assert_eq!(slot.chunk_index, 3);
        assert!(task.descriptor.url.ends_with("chunk3"));
    }

    #[tokio::test]
    async fn slot_delivers_success() {
        let (task, slot) = chunk_slot_pair(0, descriptor(0));
        let chunk = DecodedChunk::Rows(vec![RawRow::Typed(vec![TypedValue::Int(1)])]);
        task.result_tx.send(Ok(chunk)).unwrap();

        let received = slot.result_rx.await.unwrap().unwrap();
        assert_eq!(received.row_count(), 1);
    }

    #[tokio::test]
    async fn slot_delivers_error() {
        let (task, slot) = chunk_slot_pair(0, descriptor(0));
        task.result_tx
            .send(Err(Error::chunk_fetch(Some(500), "boom")))
            .unwrap();

        let received = slot.result_rx.await.unwrap();
        assert!(matches!(received, Err(Error::ChunkFetch { .. })));
    }

    #[tokio::test]
    async fn dropped_writer_closes_slot() {
        let (task, slot) = chunk_slot_pair(0, descriptor(0));
        drop(task.result_tx);
        assert!(slot.result_rx.await.is_err());
    }

    #[tokio::test]
    async fn slots_resolve_independently_of_completion_order() {
        let (task0, slot0) = chunk_slot_pair(0, descriptor(0));
        let (task1, slot1) = chunk_slot_pair(1, descriptor(1));

        // chunk 1 finishes first
        task1
            .result_tx
            .send(Ok(DecodedChunk::Rows(vec![])))
            .unwrap();
        task0
            .result_tx
            .send(Ok(DecodedChunk::Rows(vec![])))
            .unwrap();

        assert!(slot0.result_rx.await.unwrap().is_ok());
        assert!(slot1.result_rx.await.unwrap().is_ok());
    }
}
