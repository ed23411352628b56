//! Consumer lag derived from high-water marks and committed offsets.

use serde::Serialize;

/// Committed offset of one partition and how far it trails the high-water mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerOffset {
    pub offset: i64,
    pub lag: i64,
}

/// Pairs every high-water mark in `maxima` with the committed offset at the
/// same partition index.
///
/// Partitions without a committed offset count as offset `0`. Lag never goes
/// below zero, consumers may briefly be ahead of a stale high-water mark.
pub fn compute(maxima: &[i64], offsets: &[i64]) -> Vec<ConsumerOffset> {
    maxima
        .iter()
        .enumerate()
        .map(|(i, &max)| {
            let offset = offsets.get(i).copied().unwrap_or_default();
            ConsumerOffset {
                offset,
                lag: (max - offset).max(0),
            }
        })
        .collect()
}
