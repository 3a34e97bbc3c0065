//! Lock-free engine statistics using atomic operations
//!
//! Tracks dispatch and outcome totals across all campaigns without mutex
//! contention.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::session::SessionOutcome;

/// Engine-wide counters aggregated across all sessions
#[derive(Debug, Default)]
pub struct EngineStats {
    pub sessions_dispatched: AtomicU64,
    pub in_flight: AtomicU64,
    pub success: AtomicU64,
    pub partial: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
    pub ticks: AtomicU64,
    pub start_time: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            start_time: AtomicU64::new(now),
            ..Default::default()
        }
    }

    /// Record sessions handed to the pool this tick
    pub fn record_dispatched(&self, count: u64) {
        self.sessions_dispatched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment in-flight sessions
    pub fn session_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement in-flight sessions and tally the outcome
    pub fn session_finished(&self, outcome: SessionOutcome) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        match outcome {
            SessionOutcome::Success => self.success.fetch_add(1, Ordering::Relaxed),
            SessionOutcome::Partial => self.partial.fetch_add(1, Ordering::Relaxed),
            SessionOutcome::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            SessionOutcome::TimedOut => self.timed_out.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Dispatched sessions per hour since startup
    pub fn sessions_per_hour(&self) -> f64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let start = self.start_time.load(Ordering::Relaxed);
        let elapsed_hours = (now.saturating_sub(start)) as f64 / 3600.0;

        if elapsed_hours < 0.001 {
            return 0.0;
        }

        self.sessions_dispatched.load(Ordering::Relaxed) as f64 / elapsed_hours
    }

    /// Get snapshot for serialization
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            sessions_dispatched: self.sessions_dispatched.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            sessions_per_hour: self.sessions_per_hour(),
        }
    }
}

/// Serializable snapshot of engine stats
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatsSnapshot {
    pub sessions_dispatched: u64,
    pub in_flight: u64,
    pub success: u64,
    pub partial: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub ticks: u64,
    pub sessions_per_hour: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_tallies() {
        let stats = EngineStats::new();
        stats.record_dispatched(3);

        stats.session_started();
        stats.session_started();
        stats.session_started();
        assert_eq!(stats.in_flight(), 3);

        stats.session_finished(SessionOutcome::Success);
        stats.session_finished(SessionOutcome::Partial);
        stats.session_finished(SessionOutcome::TimedOut);

        let snap = stats.snapshot();
        assert_eq!(snap.in_flight, 0);
        assert_eq!(snap.success, 1);
        assert_eq!(snap.partial, 1);
        assert_eq!(snap.timed_out, 1);
        assert_eq!(snap.failed, 0);
        assert_eq!(snap.sessions_dispatched, 3);
    }
}
