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

//! Multi-statement result-set navigation.
//!
//! A multi-statement execution yields one downloader per child statement.
//! The chain is an ordered sequence advanced by index; only the active
//! downloader streams rows. Result sets are strictly sequential: the next
//! statement's fetching starts when the chain advances, never earlier.

use crate::error::{Error, Result};
use crate::reader::downloader::{ChunkDownloader, DownloaderState};
use crate::reader::Row;
use crate::types::wire::RowType;
use arrow_array::RecordBatch;
use tracing::debug;

/// An ordered sequence of result sets produced by one execution.
#[derive(Debug)]
pub struct ResultSetChain {
    sets: Vec<ChunkDownloader>,
    current: usize,
}

impl ResultSetChain {
    /// Build a chain and start the first result set's downloader.
    ///
    /// An empty sequence is a protocol violation: the caller only constructs
    /// a chain when the server declared at least one result.
    pub(crate) fn new(sets: Vec<ChunkDownloader>) -> Result<Self> {
        if sets.is_empty() {
            return Err(Error::protocol(
                "execution declared child results but delivered no result links",
            ));
        }
        let mut chain = Self { sets, current: 0 };
        chain.sets[0].start()?;
        Ok(chain)
    }

    /// Column metadata of the active result set.
    pub fn row_type(&self) -> &[RowType] {
        self.sets[self.current].row_type()
    }

    /// Column names of the active result set.
    pub fn columns(&self) -> Vec<&str> {
        self.row_type().iter().map(|c| c.name.as_str()).collect()
    }

    /// Total row count the server declared for the active result set.
    pub fn total_rows(&self) -> i64 {
        self.sets[self.current].total_rows()
    }

    /// Deliver the next row of the active result set.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        self.sets[self.current].next_row().await
    }

    /// Drain the active result set as raw columnar batches.
    pub async fn take_batches(&mut self) -> Result<Vec<RecordBatch>> {
        self.sets[self.current].take_batches().await
    }

    /// Whether another result set follows the active one.
    pub fn has_next_result_set(&self) -> bool {
        self.current + 1 < self.sets.len()
    }

    /// Advance to the next result set and start its downloader.
    ///
    /// Legal only once the active result set is exhausted. Returns `false`
    /// when the chain has no further result sets.
    pub fn next_result_set(&mut self) -> Result<bool> {
        if self.sets[self.current].state() != DownloaderState::Exhausted {
            return Err(Error::invalid_state(
                "next_result_set() before the current result set is exhausted",
            ));
        }
        if !self.has_next_result_set() {
            return Ok(false);
        }
        self.current += 1;
        debug!("advancing to result set {}", self.current);
        self.sets[self.current].start()?;
        Ok(true)
    }

    /// State of the active result set.
    pub fn state(&self) -> DownloaderState {
        self.sets[self.current].state()
    }

    /// Abort every result set in the chain.
    pub fn cancel(&self) {
        for set in &self.sets {
            set.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::fetcher::ChunkFetch;
    use crate::reader::{ChunkDescriptor, DecodedChunk, RawRow};
    use crate::types::options::{DownloaderConfig, QueryOptions};
    use crate::value::TypedValue;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug)]
    struct NoRemoteChunks;

    #[async_trait]
    impl ChunkFetch for NoRemoteChunks {
        async fn fetch(&self, _: &ChunkDescriptor) -> Result<DecodedChunk> {
            panic!("no remote chunks expected in this test");
        }
    }

    fn inline_set(values: &[i64]) -> ChunkDownloader {
        let row_type = vec![RowType {
            name: "N".into(),
            column_type: "fixed".into(),
            ..Default::default()
        }];
        let rows = values
            .iter()
            .map(|v| RawRow::Text(vec![Some(v.to_string())]))
            .collect();
        ChunkDownloader::from_parts(
            row_type,
            rows,
            Vec::new(),
            Arc::new(NoRemoteChunks),
            DownloaderConfig::default(),
            QueryOptions::default(),
            &CancellationToken::new(),
        )
    }

    async fn drain(chain: &mut ResultSetChain) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(row) = chain.next_row().await.unwrap() {
            match row.get(0) {
                Some(TypedValue::Int(v)) => out.push(*v),
                other => panic!("unexpected value {other:?}"),
            }
        }
        out
    }

    #[tokio::test]
    async fn two_statement_chain_walks_in_order() {
        let mut chain =
            ResultSetChain::new(vec![inline_set(&[1, 2]), inline_set(&[10])]).unwrap();

        assert_eq!(drain(&mut chain).await, vec![1, 2]);
        assert!(chain.has_next_result_set());

        assert!(chain.next_result_set().unwrap());
        assert_eq!(drain(&mut chain).await, vec![10]);
        assert!(!chain.has_next_result_set());

        // a further advance signals end of results
        assert!(!chain.next_result_set().unwrap());
    }

    #[tokio::test]
    async fn advance_before_exhaustion_is_rejected() {
        let mut chain =
            ResultSetChain::new(vec![inline_set(&[1, 2]), inline_set(&[10])]).unwrap();

        // one row still pending in result set 0
        assert!(chain.next_row().await.unwrap().is_some());
        let err = chain.next_result_set().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        // draining unblocks the advance
        assert!(chain.next_row().await.unwrap().is_some());
        assert!(chain.next_row().await.unwrap().is_none());
        assert!(chain.next_result_set().unwrap());
    }

    #[test]
    fn empty_chain_is_a_protocol_violation() {
        let err = ResultSetChain::new(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn single_statement_chain_has_no_next() {
        let mut chain = ResultSetChain::new(vec![inline_set(&[5])]).unwrap();
        assert!(!chain.has_next_result_set());
        assert_eq!(drain(&mut chain).await, vec![5]);
        assert!(!chain.next_result_set().unwrap());
    }

    #[tokio::test]
    async fn columns_follow_the_active_result_set() {
        let chain = ResultSetChain::new(vec![inline_set(&[1])]).unwrap();
        assert_eq!(chain.columns(), vec!["N"]);
    }
}
