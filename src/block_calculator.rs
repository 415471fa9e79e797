//! Block Calculator
//!
//! Plans the block-aligned remote fetches that cover a byte range

use crate::models::{ByteRange, BlockSpec};
use tracing::debug;

/// Calculator for splitting a byte range into block-aligned fetches
pub struct BlockCalculator {
    /// Size of each remote block in bytes
    block_size: usize,
}

impl BlockCalculator {
    /// Create a new BlockCalculator
    ///
    /// # Arguments
    /// * `block_size` - Size of each remote fetch in bytes; must be non-zero
    pub fn new(block_size: usize) -> Self {
        BlockCalculator {
            block_size: block_size.max(1),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks needed to cover `range`
    pub fn count_blocks(&self, range: ByteRange) -> usize {
        let block_size = self.block_size as u64;
        let first = range.start / block_size;
        let last = range.end / block_size;
        (last - first + 1) as usize
    }

    /// The block fetch that delivers the bytes starting at `cursor`
    ///
    /// `cursor` must not exceed `end`.
    pub fn block_at(&self, index: usize, cursor: u64, end: u64) -> BlockSpec {
        let block_size = self.block_size as u64;
        let offset = (cursor / block_size) * block_size;
        let skip = cursor - offset;
        let take = (block_size - skip).min(end - cursor + 1);

        BlockSpec {
            index,
            offset,
            skip: skip as usize,
            take: take as usize,
        }
    }

    /// Calculate the fetches that deliver exactly the bytes of `range`
    ///
    /// # Behavior
    /// - Every fetch offset is a multiple of `block_size`
    /// - The first block skips the bytes before `range.start`
    /// - The last block takes only up to `range.end`
    /// - Concatenating `[skip, skip + take)` of each block yields the range
    pub fn calculate_blocks(&self, range: ByteRange) -> Vec<BlockSpec> {
        let mut blocks = Vec::with_capacity(self.count_blocks(range));
        let mut cursor = range.start;
        let mut index = 0;

        while cursor <= range.end {
            let block = self.block_at(index, cursor, range.end);
            cursor += block.take as u64;
            index += 1;
            blocks.push(block);
        }

        debug!(
            "Calculated {} blocks for range {}-{} (block_size={})",
            blocks.len(),
            range.start,
            range.end,
            self.block_size
        );

        blocks
    }
}
