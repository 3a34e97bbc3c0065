//! Retry and backoff control
//!
//! Bounded retry policy with exponential backoff and jitter for remote
//! automation steps.

mod backoff;

pub use backoff::{RetryPolicy, backoff_with_jitter};
