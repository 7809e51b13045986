use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::{ChunkOutcome, ChunkResult};

/// One chunk that could not be archived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub archive_name: String,
    pub chunk_index: u32,
    pub reason: String,
}

/// Totals for one run. Order of `record` calls does not matter except for the
/// order of `failures`, which follows delivery.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PackStats {
    pub chunks: u64,
    pub chunks_failed: u64,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    pub failures: Vec<ChunkFailure>,
}

impl PackStats {
    /// `original / compressed`, or `None` when nothing was compressed.
    pub fn ratio(&self) -> Option<f64> {
        if self.compressed_bytes == 0 {
            None
        } else {
            Some(self.original_bytes as f64 / self.compressed_bytes as f64)
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Single-owner accumulator, fed only by the coordinating thread.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    stats: PackStats,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &ChunkResult) {
        self.stats.chunks += 1;
        match &result.outcome {
            ChunkOutcome::Compressed { payload, original_length } => {
                self.stats.original_bytes += original_length;
                self.stats.compressed_bytes += payload.len() as u64;
            }
            ChunkOutcome::Failed(err) => {
                warn!("Error processing {} (chunk {}): {}", result.archive_name, result.chunk_index, err);
                self.stats.chunks_failed += 1;
                self.stats.failures.push(ChunkFailure {
                    archive_name: result.archive_name.to_string(),
                    chunk_index: result.chunk_index,
                    reason: err.to_string(),
                });
            }
        }
    }

    pub fn snapshot(&self) -> &PackStats {
        &self.stats
    }

    pub fn finish(self) -> PackStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChunkError;
    use std::sync::Arc;

    fn ok(name: &str, idx: u32, orig: u64, comp: usize) -> ChunkResult {
        ChunkResult {
            archive_name: Arc::from(name),
            chunk_index: idx,
            outcome: ChunkOutcome::Compressed { payload: vec![0; comp], original_length: orig },
        }
    }

    fn failed(name: &str, idx: u32) -> ChunkResult {
        ChunkResult {
            archive_name: Arc::from(name),
            chunk_index: idx,
            outcome: ChunkOutcome::Failed(ChunkError::Read(std::io::ErrorKind::UnexpectedEof.into())),
        }
    }

    #[test]
    fn totals_are_order_independent() {
        let results = || vec![ok("a", 0, 100, 10), ok("a", 1, 50, 5), ok("b", 0, 0, 9)];
        let mut fwd = StatsAggregator::new();
        results().iter().for_each(|r| fwd.record(r));
        let mut rev = StatsAggregator::new();
        results().iter().rev().for_each(|r| rev.record(r));

        let (fwd, rev) = (fwd.finish(), rev.finish());
        assert_eq!((fwd.original_bytes, fwd.compressed_bytes, fwd.chunks), (150, 24, 3));
        assert_eq!((rev.original_bytes, rev.compressed_bytes, rev.chunks), (150, 24, 3));
        assert_eq!(fwd.ratio(), rev.ratio());
    }

    #[test]
    fn failures_are_listed_and_excluded_from_totals() {
        let mut agg = StatsAggregator::new();
        agg.record(&ok("a.txt", 0, 10, 2));
        agg.record(&failed("a.txt", 1));
        let stats = agg.finish();
        assert_eq!(stats.original_bytes, 10);
        assert_eq!(stats.chunks_failed, 1);
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].archive_name, "a.txt");
        assert_eq!(stats.failures[0].chunk_index, 1);
        assert!(stats.failures[0].reason.starts_with("read failed"));
    }

    #[test]
    fn ratio_guards_against_zero() {
        let mut agg = StatsAggregator::new();
        agg.record(&failed("x", 0));
        assert_eq!(agg.snapshot().ratio(), None);
        assert_eq!(PackStats::default().ratio(), None);
    }
}
