//! Median-time-past timestamp rule.

use crate::params::MEDIAN_TIME_SPAN;
use crate::{ConsensusError, ConsensusResult};
use std::collections::VecDeque;

/// Median of exactly eleven timestamps.
pub fn median_time_past(timestamps: &[u32; MEDIAN_TIME_SPAN]) -> u32 {
    let mut sorted = *timestamps;
    sorted.sort_unstable();
    sorted[MEDIAN_TIME_SPAN / 2]
}

/// Fail with `InvalidBlockTime` when `time` is below the median.
pub fn check_block_time(time: u32, median: u32) -> ConsensusResult<()> {
    if time < median {
        return Err(ConsensusError::InvalidBlockTime { time, median });
    }
    Ok(())
}

/// Sliding window over the most recent ancestor timestamps, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampWindow {
    times: VecDeque<u32>,
}

impl TimestampWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a window from ancestor timestamps, oldest first. Only the last
    /// eleven are kept.
    pub fn from_ancestors(times: impl IntoIterator<Item = u32>) -> Self {
        let mut window = Self::new();
        for time in times {
            window.push(time);
        }
        window
    }

    /// Append the timestamp of a newly accepted block.
    pub fn push(&mut self, time: u32) {
        if self.times.len() == MEDIAN_TIME_SPAN {
            self.times.pop_front();
        }
        self.times.push_back(time);
    }

    /// Number of timestamps held.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether no timestamps are held.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Whether a full eleven-block window is available.
    pub fn is_full(&self) -> bool {
        self.times.len() == MEDIAN_TIME_SPAN
    }

    /// Timestamp of the most recent block (the parent).
    pub fn newest(&self) -> Option<u32> {
        self.times.back().copied()
    }

    /// Median of the window, or the parent's timestamp while fewer than
    /// eleven ancestors are known.
    pub fn median_time_past(&self) -> u32 {
        if self.is_full() {
            let mut buf = [0u32; MEDIAN_TIME_SPAN];
            for (slot, time) in buf.iter_mut().zip(self.times.iter()) {
                *slot = *time;
            }
            median_time_past(&buf)
        } else {
            self.newest().unwrap_or(0)
        }
    }
}
