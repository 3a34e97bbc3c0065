//! In-memory campaign store
//!
//! Keyed by campaign id. All mutations happen under the entry lock, so the
//! volume counter is a single conditional update rather than a
//! read-modify-write across calls.

use chrono::Utc;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;
use super::{Campaign, CampaignStatus};

/// Store for campaign aggregates
#[derive(Default)]
pub struct CampaignStore {
    campaigns: DashMap<Uuid, Campaign>,
}

impl CampaignStore {
    pub fn new() -> Self {
        Self {
            campaigns: DashMap::new(),
        }
    }

    /// Insert a campaign, returning its id
    pub fn insert(&self, campaign: Campaign) -> Uuid {
        let id = campaign.id;
        self.campaigns.insert(id, campaign);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<Campaign> {
        self.campaigns.get(id).map(|c| c.clone())
    }

    pub fn list(&self) -> Vec<Campaign> {
        self.campaigns.iter().map(|c| c.clone()).collect()
    }

    /// Campaigns the scheduler should consider this tick
    pub fn active(&self) -> Vec<Campaign> {
        self.campaigns
            .iter()
            .filter(|c| c.status.is_active())
            .map(|c| c.clone())
            .collect()
    }

    /// Activate a draft campaign.
    ///
    /// Only `draft -> active` is legal. Re-activating an already-active
    /// campaign is a client error so volume counters are never
    /// double-started.
    pub fn activate(&self, id: &Uuid) -> Result<Campaign, EngineError> {
        let mut entry = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("campaign {}", id)))?;

        match entry.status {
            CampaignStatus::Draft => {
                entry.status = CampaignStatus::Active;
                entry.started_at = Some(Utc::now());
                info!("Campaign {} activated", id);
                Ok(entry.clone())
            }
            CampaignStatus::Active => Err(EngineError::Client(format!(
                "campaign {} is already active",
                id
            ))),
            other => Err(EngineError::Client(format!(
                "campaign {} cannot be activated from status {:?}",
                id, other
            ))),
        }
    }

    /// Pause an active campaign. In-flight sessions run to completion; the
    /// scheduler simply stops dispatching new ones.
    pub fn pause(&self, id: &Uuid) -> Result<(), EngineError> {
        let mut entry = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("campaign {}", id)))?;

        if entry.status != CampaignStatus::Active {
            return Err(EngineError::Client(format!(
                "campaign {} is not active",
                id
            )));
        }

        entry.status = CampaignStatus::Paused;
        info!("Campaign {} paused", id);
        Ok(())
    }

    /// Mark an active campaign completed
    pub fn complete(&self, id: &Uuid) {
        if let Some(mut entry) = self.campaigns.get_mut(id) {
            if entry.status == CampaignStatus::Active {
                entry.status = CampaignStatus::Completed;
                entry.completed_at = Some(Utc::now());
                info!(
                    "Campaign {} completed: all {} sessions finished",
                    id, entry.sessions_created
                );
            }
        }
    }

    /// Mark an active campaign failed
    pub fn fail(&self, id: &Uuid, reason: &str) {
        if let Some(mut entry) = self.campaigns.get_mut(id) {
            if entry.status == CampaignStatus::Active {
                entry.status = CampaignStatus::Failed;
                entry.last_error = Some(reason.to_string());
            }
        }
    }

    /// Atomically reserve this tick's session quota:
    /// `min(remaining, sessions_per_tick)`.
    ///
    /// The reservation bumps `sessions_created` under the entry lock, so
    /// concurrent ticks can never push the created count past
    /// `total_sessions`.
    pub fn reserve_quota(&self, id: &Uuid) -> Result<u32, EngineError> {
        let mut entry = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("campaign {}", id)))?;

        if !entry.status.is_active() {
            return Ok(0);
        }

        let quota = entry.remaining_sessions().min(entry.sessions_per_tick);
        entry.sessions_created += quota;
        Ok(quota)
    }

    /// Record a dispatch error against one campaign without touching its
    /// status; other campaigns in the same tick proceed unaffected.
    pub fn record_error(&self, id: &Uuid, message: &str) {
        if let Some(mut entry) = self.campaigns.get_mut(id) {
            entry.last_error = Some(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::NewCampaign;
    use crate::scheduler::ScheduleWindow;

    fn store_with_campaign(total: u32, per_tick: u32) -> (CampaignStore, Uuid) {
        let store = CampaignStore::new();
        let id = store.insert(Campaign::from_request(NewCampaign {
            name: "test".into(),
            owner_id: Uuid::new_v4(),
            target_url: "https://target.com/".into(),
            search_keyword: "target".into(),
            total_sessions: total,
            sessions_per_tick: per_tick,
            window: ScheduleWindow::default(),
        }));
        (store, id)
    }

    #[test]
    fn test_activate_draft() {
        let (store, id) = store_with_campaign(10, 3);
        let campaign = store.activate(&id).unwrap();
        assert_eq!(campaign.status, CampaignStatus::Active);
        assert!(campaign.started_at.is_some());
    }

    #[test]
    fn test_double_activation_is_client_error() {
        let (store, id) = store_with_campaign(10, 3);
        store.activate(&id).unwrap();
        let err = store.activate(&id).unwrap_err();
        assert!(matches!(err, EngineError::Client(_)));
        // Counters untouched by the failed second activation
        assert_eq!(store.get(&id).unwrap().sessions_created, 0);
    }

    #[test]
    fn test_activate_missing_campaign() {
        let store = CampaignStore::new();
        let err = store.activate(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_paused_campaign_cannot_reactivate() {
        let (store, id) = store_with_campaign(10, 3);
        store.activate(&id).unwrap();
        store.pause(&id).unwrap();
        assert!(store.activate(&id).is_err());
    }

    #[test]
    fn test_quota_never_exceeds_total() {
        let (store, id) = store_with_campaign(10, 4);
        store.activate(&id).unwrap();

        let mut dispatched = 0;
        for _ in 0..10 {
            dispatched += store.reserve_quota(&id).unwrap();
        }

        assert_eq!(dispatched, 10);
        assert_eq!(store.get(&id).unwrap().sessions_created, 10);
        assert_eq!(store.get(&id).unwrap().remaining_sessions(), 0);
    }

    #[test]
    fn test_quota_respects_per_tick_limit() {
        let (store, id) = store_with_campaign(100, 7);
        store.activate(&id).unwrap();
        assert_eq!(store.reserve_quota(&id).unwrap(), 7);
    }

    #[test]
    fn test_quota_zero_for_inactive() {
        let (store, id) = store_with_campaign(100, 7);
        assert_eq!(store.reserve_quota(&id).unwrap(), 0);
    }

    #[test]
    fn test_record_error_keeps_status() {
        let (store, id) = store_with_campaign(10, 3);
        store.activate(&id).unwrap();
        store.record_error(&id, "no usable proxy");
        let campaign = store.get(&id).unwrap();
        assert_eq!(campaign.status, CampaignStatus::Active);
        assert_eq!(campaign.last_error.as_deref(), Some("no usable proxy"));
    }
}
