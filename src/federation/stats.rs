// SPDX-License-Identifier: Apache-2.0

//! Process-wide federation counters.
//!
//! One record behind one mutex: a completed query lands all of its counter
//! updates in a single critical section, and reset swaps the whole record
//! at once, so a concurrent reader never observes a half-reset state.

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    total_data_transferred: u64,
    queries_executed: u64,
    queries_failed: u64,
    cache_hits: u64,
    cache_misses: u64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatisticsSnapshot {
    /// Serialized bytes fetched from source databases.
    pub total_data_transferred: u64,
    pub queries_executed: u64,
    pub queries_failed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Live connections at snapshot time; reported, not resettable.
    pub databases: usize,
}

#[derive(Debug, Default)]
pub struct FederationStatistics {
    counters: Mutex<Counters>,
}

impl FederationStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed query in a single update.
    pub fn record_completed(&self, bytes_transferred: u64, cache_hit: bool) {
        let mut counters = self.counters.lock();
        counters.queries_executed += 1;
        counters.total_data_transferred += bytes_transferred;
        if cache_hit {
            counters.cache_hits += 1;
        } else {
            counters.cache_misses += 1;
        }
    }

    pub fn record_failed(&self) {
        self.counters.lock().queries_failed += 1;
    }

    pub fn snapshot(&self, databases: usize) -> StatisticsSnapshot {
        let counters = *self.counters.lock();
        StatisticsSnapshot {
            total_data_transferred: counters.total_data_transferred,
            queries_executed: counters.queries_executed,
            queries_failed: counters.queries_failed,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            databases,
        }
    }

    /// Atomic swap back to zero.
    pub fn reset(&self) {
        *self.counters.lock() = Counters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_queries_accumulate() {
        let stats = FederationStatistics::new();
        stats.record_completed(1_024, false);
        stats.record_completed(0, true);
        stats.record_failed();

        let snapshot = stats.snapshot(3);
        assert_eq!(snapshot.queries_executed, 2);
        assert_eq!(snapshot.queries_failed, 1);
        assert_eq!(snapshot.total_data_transferred, 1_024);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.databases, 3);
    }

    #[test]
    fn reset_zeroes_every_counter_at_once() {
        let stats = FederationStatistics::new();
        stats.record_completed(512, false);
        stats.record_failed();
        stats.reset();

        let snapshot = stats.snapshot(0);
        assert_eq!(snapshot.queries_executed, 0);
        assert_eq!(snapshot.queries_failed, 0);
        assert_eq!(snapshot.total_data_transferred, 0);
        assert_eq!(snapshot.cache_hits, 0);
        assert_eq!(snapshot.cache_misses, 0);
    }
}
