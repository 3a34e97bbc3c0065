//! In-memory session store
//!
//! Sessions are created by the scheduler's dispatch, advanced by the runner
//! and by externally reported events, and read for inspection. Updates are
//! per-entity under the map's entry lock; a session's stage only changes
//! here, so the runner's view never drifts from what was persisted.

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use super::state::{
    BotSession, ResolvedResult, SessionEvent, SessionOutcome, SessionStage, StageTransition,
};

/// Partial direct field update, the `{update: ...}` form of the
/// session-event interface. Each present field is translated into the
/// corresponding stage advance so out-of-order updates stay detectable.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionUpdate {
    pub search_completed: Option<bool>,
    pub result_clicked_url: Option<String>,
    pub target_reached: Option<bool>,
    pub plugin_loaded: Option<bool>,
    pub plugin_active: Option<bool>,
    pub extension_id: Option<String>,
}

/// Per-campaign session tallies
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounts {
    pub running: u32,
    pub success: u32,
    pub partial: u32,
    pub failed: u32,
    pub timed_out: u32,
}

/// Store for bot sessions
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, BotSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Create and store a new session for a campaign, returning its id
    pub fn create(&self, campaign_id: Uuid) -> Uuid {
        let session = BotSession::new(campaign_id);
        let id = session.id;
        self.sessions.insert(id, session);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<BotSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn list_for_campaign(&self, campaign_id: &Uuid) -> Vec<BotSession> {
        self.sessions
            .iter()
            .filter(|s| &s.campaign_id == campaign_id)
            .map(|s| s.clone())
            .collect()
    }

    /// Sessions for a campaign that have not reached a terminal outcome
    pub fn running_count(&self, campaign_id: &Uuid) -> u32 {
        self.sessions
            .iter()
            .filter(|s| &s.campaign_id == campaign_id && !s.is_terminal())
            .count() as u32
    }

    pub fn counts_for_campaign(&self, campaign_id: &Uuid) -> SessionCounts {
        let mut counts = SessionCounts::default();
        for s in self.sessions.iter().filter(|s| &s.campaign_id == campaign_id) {
            match s.outcome {
                None => counts.running += 1,
                Some(SessionOutcome::Success) => counts.success += 1,
                Some(SessionOutcome::Partial) => counts.partial += 1,
                Some(SessionOutcome::Failed) => counts.failed += 1,
                Some(SessionOutcome::TimedOut) => counts.timed_out += 1,
            }
        }
        counts
    }

    /// Advance a session one stage. The runner goes through this so a stage
    /// becomes visible only once the store accepted it.
    pub fn advance(&self, id: &Uuid, stage: SessionStage) -> Result<StageTransition, EngineError> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("session {}", id)))?;
        Ok(entry.advance(stage, Utc::now()))
    }

    /// Apply an externally reported event, idempotently.
    pub fn apply_event(
        &self,
        id: &Uuid,
        event: SessionEvent,
        extension_id: Option<String>,
    ) -> Result<StageTransition, EngineError> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("session {}", id)))?;

        let transition = entry.apply_event(event, extension_id, Utc::now());
        if transition == StageTransition::Rejected {
            warn!(
                "Session {} rejected out-of-order event {:?} at stage {:?}",
                id, event, entry.stage
            );
        }
        Ok(transition)
    }

    /// Apply a partial field update by translating each present field into
    /// its stage advance, in stage order.
    pub fn apply_update(&self, id: &Uuid, update: SessionUpdate) -> Result<(), EngineError> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("session {}", id)))?;

        let now = Utc::now();

        if update.search_completed == Some(true) {
            entry.advance(SessionStage::SearchCompleted, now);
        }
        if let Some(url) = update.result_clicked_url {
            entry.resolved_result.get_or_insert(ResolvedResult::Clicked(url));
            entry.advance(SessionStage::ResultResolved, now);
        }
        if update.target_reached == Some(true) {
            entry.advance(SessionStage::TargetReached, now);
        }
        if update.plugin_loaded == Some(true) {
            entry.apply_event(SessionEvent::PluginLoaded, update.extension_id.clone(), now);
        } else if let Some(ext) = update.extension_id {
            entry.extension_id.get_or_insert(ext);
        }
        if update.plugin_active == Some(true) {
            entry.apply_event(SessionEvent::PluginActive, None, now);
        }

        Ok(())
    }

    pub fn set_resolved_result(&self, id: &Uuid, result: ResolvedResult) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.resolved_result = Some(result);
        }
    }

    pub fn mark_outcome(&self, id: &Uuid, outcome: SessionOutcome, error: Option<String>) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.mark_outcome(outcome, error);
        }
    }

    /// Current stage, if the session exists
    pub fn stage(&self, id: &Uuid) -> Option<SessionStage> {
        self.sessions.get(id).map(|s| s.stage)
    }

    /// Block (bounded) until the session reaches `stage` or the timeout
    /// elapses. Signals arrive through the event interface on another task,
    /// so this polls the store.
    pub async fn wait_for_stage(&self, id: &Uuid, stage: SessionStage, timeout: Duration) -> bool {
        const POLL_INTERVAL: Duration = Duration::from_millis(250);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.stage(id) {
                Some(current) if current.order() >= stage.order() => return true,
                None => return false,
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }

    /// Force sessions that have been running longer than `max_age` to
    /// `timed_out` so a wedged remote browser cannot hold a slot forever.
    pub fn sweep_stuck(&self, max_age: Duration) -> u32 {
        let cutoff =
            Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let mut swept = 0;

        for mut entry in self.sessions.iter_mut() {
            if !entry.is_terminal() && entry.created_at < cutoff {
                entry.mark_outcome(
                    SessionOutcome::TimedOut,
                    Some(format!("session exceeded {}s", max_age.as_secs())),
                );
                swept += 1;
            }
        }

        if swept > 0 {
            info!("Swept {} stuck sessions to timed_out", swept);
        }
        swept
    }
}
