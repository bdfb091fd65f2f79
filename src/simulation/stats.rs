//! Statistics Aggregator.
//!
//! Counts transmission requests, MAC attempts (data confirms of any status)
//! and successful receptions. Counters only grow; a fresh aggregator is
//! created for each simulation.

use serde::Serialize;
use std::fmt;

use super::types::MacStatus;

#[derive(Debug, Default, Clone)]
pub struct Statistics {
    requested: u64,
    attempted: u64,
    received: u64,
    failed: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transmission was scheduled by a round.
    pub fn record_requested(&mut self) {
        self.requested += 1;
    }

    /// The MAC confirmed an attempt with `status`.
    pub fn record_attempted(&mut self, status: MacStatus) {
        self.attempted += 1;
        if !status.is_success() {
            self.failed += 1;
        }
    }

    /// A data indication reached the destination.
    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let ratio = if self.attempted == 0 { 0.0 } else { self.received as f64 * 100.0 / self.attempted as f64 };
        StatsSnapshot {
            requested: self.requested,
            attempted: self.attempted,
            received: self.received,
            failed: self.failed,
            ratio,
        }
    }
}

/// Point-in-time copy of the counters. `ratio` is received / attempted as a
/// percentage, defined as 0 when nothing was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub requested: u64,
    pub attempted: u64,
    pub received: u64,
    /// Attempts confirmed with a non-success status.
    pub failed: u64,
    pub ratio: f64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total requested TX: {}\ttotal tried TX: {}\ttotal successful RX: {}\tratio: {:.1}%",
            self.requested, self.attempted, self.received, self.ratio
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_zero_without_attempts() {
        let mut stats = Statistics::new();
        stats.record_requested();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requested, 1);
        assert_eq!(snapshot.attempted, 0);
        assert_eq!(snapshot.ratio, 0.0);
        assert!(!snapshot.ratio.is_nan());
    }

    #[test]
    fn ratio_counts_received_over_attempted() {
        let mut stats = Statistics::new();
        for _ in 0..4 {
            stats.record_requested();
        }
        stats.record_attempted(MacStatus::Success);
        stats.record_received();
        stats.record_attempted(MacStatus::Success);
        stats.record_received();
        stats.record_attempted(MacStatus::ChannelAccessFailure);
        stats.record_attempted(MacStatus::NoAck);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.attempted, 4);
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.failed, 2);
        assert!((snapshot.ratio - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_line_uses_one_decimal() {
        let mut stats = Statistics::new();
        for _ in 0..3 {
            stats.record_requested();
            stats.record_attempted(MacStatus::Success);
        }
        stats.record_received();
        let line = stats.snapshot().to_string();
        assert!(line.contains("total requested TX: 3"));
        assert!(line.contains("total tried TX: 3"));
        assert!(line.contains("total successful RX: 1"));
        assert!(line.ends_with("ratio: 33.3%"));
    }
}
