//! Engine error types

use thiserror::Error;

/// Errors surfaced by the orchestration engine.
///
/// `Client` and `NotFound` map to 4xx responses and are never retried.
/// `ResourceUnavailable` skips the affected dispatch for the current tick;
/// the scheduler retries it on the next tick. `Persistence` means a store
/// rejected an update; the in-memory stage is not advanced in that case.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Client(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<EngineError> for String {
    fn from(err: EngineError) -> String {
        err.to_string()
    }
}
