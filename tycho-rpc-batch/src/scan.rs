use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crate::{
    errors::ScanError,
    range::BlockBatches,
    rpc::{
        batch::RetryingBatch,
        config::{RPCRetryConfig, ScanConfig},
        retry::RetryPolicy,
        BatchTransport,
    },
    RPCError,
};

/// Fetches per-block data over a block range, one retrying batch per chunk.
///
/// Chunks are processed sequentially; calls within a chunk run concurrently.
pub struct BlockScanner<'a, T: ?Sized> {
    transport: &'a T,
    config: ScanConfig,
    retry_policy: RetryPolicy,
}

impl<'a, T: BatchTransport + ?Sized> BlockScanner<'a, T> {
    pub fn new(transport: &'a T, batch_size: usize) -> Self {
        Self {
            transport,
            config: ScanConfig { batch_size, ..Default::default() },
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn from_config(
        transport: &'a T,
        scan_config: &ScanConfig,
        retry_config: &RPCRetryConfig,
    ) -> Self {
        Self { transport, config: scan_config.clone(), retry_policy: retry_config.into() }
    }

    /// Only every `block_interval`-th block of each chunk is fetched (default: 1)
    pub fn with_block_interval(mut self, block_interval: usize) -> Self {
        self.config.block_interval = block_interval;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Partitions `[start_block, end_block]` according to the scanner's configuration.
    pub fn chunks(&self, start_block: u64, end_block: u64) -> Result<BlockBatches, ScanError> {
        Ok(BlockBatches::new(
            start_block,
            end_block,
            self.config.batch_size,
            self.config.block_interval,
        )?)
    }

    /// Calls `method` for every selected block in the range and returns `(block, result)` pairs
    /// in block order. Stops at the first chunk that cannot be completed.
    #[instrument(skip(self, params_for_block))]
    pub async fn scan<P, R, F>(
        &self,
        start_block: u64,
        end_block: u64,
        method: &str,
        mut params_for_block: F,
    ) -> Result<Vec<(u64, R)>, ScanError>
    where
        P: Serialize,
        R: DeserializeOwned,
        F: FnMut(u64) -> P,
    {
        let mut results = Vec::new();
        for chunk in self.chunks(start_block, end_block)? {
            let fetched = self
                .fetch_chunk(&chunk, method, &mut params_for_block)
                .await?;
            results.extend(fetched);
        }
        Ok(results)
    }

    /// Fetches one chunk of blocks as a single retrying batch.
    pub async fn fetch_chunk<P, R, F>(
        &self,
        blocks: &[u64],
        method: &str,
        mut params_for_block: F,
    ) -> Result<Vec<(u64, R)>, ScanError>
    where
        P: Serialize,
        R: DeserializeOwned,
        F: FnMut(u64) -> P,
    {
        let (Some(&first), Some(&last)) = (blocks.first(), blocks.last()) else {
            return Ok(Vec::new());
        };
        debug!(first, last, size = blocks.len(), "Fetching block chunk");

        let chunk_error = |source: RPCError| ScanError::Chunk { first, last, source };

        let mut batch =
            RetryingBatch::<T, P, R>::with_retry_policy(self.transport, self.retry_policy.clone());
        for &block in blocks {
            batch
                .add(method, params_for_block(block))
                .map_err(chunk_error)?;
        }

        let settled = batch
            .execute()
            .await
            .map_err(chunk_error)?;

        Ok(blocks
            .iter()
            .copied()
            .zip(settled.into_iter().map(|s| s.data))
            .collect())
    }
}
