//! Browser automation module
//!
//! The command/result interface to the remote headless-browser endpoint and
//! the pure search-result matching logic that decides what to click.

mod driver;
mod matcher;
mod errors;

pub use driver::{AutomationDriver, HttpDriver};
pub use matcher::{match_result, MatchResult};
pub use errors::DriverError;
