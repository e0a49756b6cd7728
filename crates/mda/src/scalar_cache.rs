//! One-chunk-deep cache for scalar reads.
//!
//! A scalar request for index `i` loads chunk `i / chunk_len` with a single
//! bulk read and serves later requests in the same chunk from memory.
//! There is no read-ahead and only one chunk is retained.

use crate::error::Result;
use crate::format::Sample;
use tracing::debug;

/// Cached chunk of values.
#[derive(Debug)]
pub struct ScalarCache<T: Sample = f64> {
    chunk_len: usize,
    chunk_index: Option<usize>,
    values: Vec<T>,
}

impl<T: Sample> ScalarCache<T> {
    /// Creates an empty cache holding `chunk_len` values per chunk.
    pub fn new(chunk_len: usize) -> Self {
        Self {
            chunk_len: chunk_len.max(1),
            chunk_index: None,
            values: Vec::new(),
        }
    }

    /// Entries per chunk.
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Index of the chunk currently held.
    pub fn cached_chunk(&self) -> Option<usize> {
        self.chunk_index
    }

    /// Drops the cached chunk.
    pub fn invalidate(&mut self) {
        self.chunk_index = None;
        self.values = Vec::new();
    }

    /// Value at linear index `i`, refilling the cache through `load` on a miss.
    ///
    /// `load(start, len)` must return `len` values beginning at `start`;
    /// callers clip `len` at the end of the array. The caller handles
    /// out-of-range indices before calling.
    ///
    /// # Errors
    ///
    /// Forwards the error from `load` and leaves the cache invalid.
    pub fn get<F>(&mut self, i: usize, total: usize, load: F) -> Result<T>
    where
        F: FnOnce(usize, usize) -> Result<Vec<T>>,
    {
        let chunk = i / self.chunk_len;
        if self.chunk_index != Some(chunk) {
            self.invalidate();
            let start = chunk * self.chunk_len;
            let len = self.chunk_len.min(total.saturating_sub(start));
            debug!("Scalar cache loading chunk {} ({} entries)", chunk, len);
            self.values = load(start, len)?;
            self.chunk_index = Some(chunk);
        }
        Ok(self
            .values
            .get(i - chunk * self.chunk_len)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MdaError;
    use std::cell::Cell;

    #[test]
    fn test_sequential_reads_load_once_per_chunk() {
        let loads = Cell::new(0);
        let mut cache: ScalarCache<f64> = ScalarCache::new(4);
        let load = |start: usize, len: usize| -> Result<Vec<f64>> {
            loads.set(loads.get() + 1);
            Ok((start..start + len).map(|v| v as f64).collect())
        };

        for i in 0..10 {
            assert_eq!(cache.get(i, 10, load).unwrap(), i as f64);
        }
        assert_eq!(loads.get(), 3);
        assert_eq!(cache.cached_chunk(), Some(2));
    }

    #[test]
    fn test_crossing_boundaries_reloads() {
        let loads = Cell::new(0);
        let mut cache: ScalarCache<f64> = ScalarCache::new(4);
        let load = |start: usize, len: usize| -> Result<Vec<f64>> {
            loads.set(loads.get() + 1);
            Ok(vec![start as f64; len])
        };
        for i in [3, 4, 3, 4] {
            cache.get(i, 8, load).unwrap();
        }
        assert_eq!(loads.get(), 4);
    }

    #[test]
    fn test_failed_load_leaves_cache_invalid() {
        let mut cache: ScalarCache<f64> = ScalarCache::new(4);
        let result = cache.get(1, 8, |_, _| Err(MdaError::Interrupted));
        assert!(result.is_err());
        assert_eq!(cache.cached_chunk(), None);
    }
}
