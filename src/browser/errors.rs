//! Automation driver error types

use thiserror::Error;

/// Errors from the remote browser automation endpoint.
///
/// `Timeout` is kept distinct from `Remote`: a timeout is terminal for the
/// step it interrupted, while a remote-side error is retried a bounded
/// number of times with backoff.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Remote step failed: {0}")]
    Remote(String),

    #[error("Step timed out: {0}")]
    Timeout(String),

    #[error("Connection to automation endpoint failed: {0}")]
    Connection(String),

    #[error("Invalid response from automation endpoint: {0}")]
    InvalidResponse(String),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout(_))
    }
}

impl From<DriverError> for String {
    fn from(err: DriverError) -> String {
        err.to_string()
    }
}
