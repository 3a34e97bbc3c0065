//! Statistics module
//!
//! Lock-free engine counters using atomic operations.

mod atomic;

pub use atomic::{EngineStats, EngineStatsSnapshot};
