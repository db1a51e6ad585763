//! Block range partitioning for batched scanning.

use crate::RangeError;

/// Splits `[start_block, end_block]` into consecutive chunks of `batch_size` blocks.
///
/// Within each chunk every `block_interval`-th block is selected, counting from the chunk's
/// first block. The stride restarts with every chunk, so for `block_interval > 1` the selected
/// blocks are not a single global arithmetic sequence.
///
/// # Example
/// ```
/// use tycho_rpc_batch::range::block_number_batches;
///
/// let batches = block_number_batches(0, 9, 5, 2).unwrap();
/// assert_eq!(batches, vec![vec![0, 2, 4], vec![5, 7, 9]]);
/// ```
pub fn block_number_batches(
    start_block: u64,
    end_block: u64,
    batch_size: usize,
    block_interval: usize,
) -> Result<Vec<Vec<u64>>, RangeError> {
    Ok(BlockBatches::new(start_block, end_block, batch_size, block_interval)?.collect())
}

/// Lazy variant of [`block_number_batches`], yielding one chunk at a time.
#[derive(Clone, Debug)]
pub struct BlockBatches {
    /// Start of the next chunk; `None` once the range is exhausted.
    next_start: Option<u64>,
    end_block: u64,
    batch_size: u64,
    block_interval: usize,
}

impl BlockBatches {
    pub fn new(
        start_block: u64,
        end_block: u64,
        batch_size: usize,
        block_interval: usize,
    ) -> Result<Self, RangeError> {
        if batch_size == 0 {
            return Err(RangeError::ZeroBatchSize);
        }
        if block_interval == 0 {
            return Err(RangeError::ZeroBlockInterval);
        }
        Ok(Self {
            next_start: (start_block <= end_block).then_some(start_block),
            end_block,
            batch_size: batch_size as u64,
            block_interval,
        })
    }
}

impl Iterator for BlockBatches {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk_start = self.next_start?;
        let chunk_end = chunk_start
            .saturating_add(self.batch_size - 1)
            .min(self.end_block);

        self.next_start = chunk_end
            .checked_add(1)
            .filter(|next| *next <= self.end_block);

        Some(
            (chunk_start..=chunk_end)
                .step_by(self.block_interval)
                .collect(),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.next_start {
            Some(start) => {
                let blocks = (self.end_block - start) as u128 + 1;
                let chunks = blocks.div_ceil(self.batch_size as u128);
                usize::try_from(chunks).unwrap_or(usize::MAX)
            }
            None => 0,
        };
        (remaining, Some(remaining))
    }
}
