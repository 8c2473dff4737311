//! Batcher: splits an ordered operation list into bounded chunks.
//!
//! Each chunk is sent as one network request. Chunking is a pure function of
//! the input length and chunk size, so chunk numbers are stable and can be
//! used for progress reporting.

use crate::error::{CoreError, Result};

/// Default number of operations per request.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Splits operation lists into chunks of at most `chunk_size` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batcher {
    chunk_size: usize,
}

impl Batcher {
    /// Create a batcher. A chunk size of zero is rejected.
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(CoreError::InvalidChunkSize);
        }
        Ok(Self { chunk_size })
    }

    /// The configured maximum chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `ops` into ordered chunks. Only the last chunk may be short.
    pub fn split<'a, T>(&self, ops: &'a [T]) -> Vec<&'a [T]> {
        ops.chunks(self.chunk_size).collect()
    }

    /// Number of chunks `split` would produce for `len` operations.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }
}

impl Default for Batcher {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(Batcher::new(0), Err(CoreError::InvalidChunkSize)));
    }

    #[test]
    fn test_split_120_by_50() {
        let ops: Vec<u32> = (0..120).collect();
        let chunks = Batcher::default().split(&ops);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert_eq!(chunks[1][0], 50);
    }

    #[test]
    fn test_split_empty() {
        let ops: Vec<u32> = Vec::new();
        assert!(Batcher::default().split(&ops).is_empty());
        assert_eq!(Batcher::default().chunk_count(0), 0);
    }

    proptest! {
        #[test]
        fn test_split_shape(len in 0usize..500, size in 1usize..80) {
            let ops: Vec<usize> = (0..len).collect();
            let batcher = Batcher::new(size).unwrap();
            let chunks = batcher.split(&ops);

            prop_assert_eq!(chunks.len(), len.div_ceil(size));
            prop_assert_eq!(chunks.len(), batcher.chunk_count(len));
            if let Some((last, full)) = chunks.split_last() {
                prop_assert!(full.iter().all(|c| c.len() == size));
                prop_assert!(!last.is_empty() && last.len() <= size);
            }

            let joined: Vec<usize> = chunks.concat();
            prop_assert_eq!(joined, ops);
        }

        #[test]
        fn test_split_deterministic(len in 0usize..300, size in 1usize..60) {
            let ops: Vec<usize> = (0..len).collect();
            let batcher = Batcher::new(size).unwrap();
            prop_assert_eq!(batcher.split(&ops), batcher.split(&ops));
        }
    }
}
