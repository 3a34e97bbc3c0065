//! Scheduling module
//!
//! The campaign control loop and the per-campaign scheduling window.

mod engine;
mod window;

pub use engine::{
    CampaignScheduler, CampaignTickResult, SchedulerConfig, TickOutcome, TickSummary,
};
pub use window::ScheduleWindow;
