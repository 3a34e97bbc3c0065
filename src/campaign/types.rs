//! Campaign types
//!
//! A campaign is the long-lived aggregate that owns bot sessions: a target
//! site, a search keyword, a session volume goal, and a scheduling window.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::scheduler::ScheduleWindow;

/// Campaign lifecycle status.
///
/// Legal transitions: `draft -> active -> {completed, paused, failed}`.
/// Activation never skips `active`, and nothing resurrects a paused or
/// failed campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Whether the scheduler should consider this campaign on a tick
    pub fn is_active(self) -> bool {
        matches!(self, CampaignStatus::Active)
    }
}

/// Request payload for creating a campaign (arrives as a draft)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub name: String,
    pub owner_id: Uuid,
    pub target_url: String,
    pub search_keyword: String,
    /// Desired total session volume
    pub total_sessions: u32,
    /// Rate limit: sessions dispatched per scheduler tick
    #[serde(default = "default_sessions_per_tick")]
    pub sessions_per_tick: u32,
    #[serde(default)]
    pub window: ScheduleWindow,
}

fn default_sessions_per_tick() -> u32 {
    10
}

/// A traffic campaign
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub target_url: String,
    pub search_keyword: String,
    /// Desired session volume
    pub total_sessions: u32,
    /// Sessions already created for this campaign; never exceeds
    /// `total_sessions`
    pub sessions_created: u32,
    /// Per-tick dispatch rate limit
    pub sessions_per_tick: u32,
    pub window: ScheduleWindow,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last dispatch error recorded against this campaign, for inspection
    pub last_error: Option<String>,
}

impl Campaign {
    /// Create a draft campaign from a request
    pub fn from_request(req: NewCampaign) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: req.owner_id,
            name: req.name,
            target_url: req.target_url,
            search_keyword: req.search_keyword,
            total_sessions: req.total_sessions,
            sessions_created: 0,
            sessions_per_tick: req.sessions_per_tick,
            window: req.window,
            status: CampaignStatus::Draft,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    /// Remaining session volume
    pub fn remaining_sessions(&self) -> u32 {
        self.total_sessions.saturating_sub(self.sessions_created)
    }

    /// Hostname of the target URL with a leading "www." stripped.
    ///
    /// This is the host the search-result matcher and the arrival check
    /// compare against.
    pub fn target_host(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.target_url).ok()?;
        let host = parsed.host_str()?;
        Some(host.strip_prefix("www.").unwrap_or(host).to_string())
    }
}
