//! Bot session state machine
//!
//! A session walks an ordered set of checkpoints from creation to plugin
//! activation. Each stage is reachable only from its immediate predecessor;
//! duplicate reports for a stage already reached are accepted as no-ops and
//! out-of-order forward jumps are rejected instead of silently applied.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;

/// Ordered checkpoints of one bot session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Created,
    SearchInitiated,
    SearchCompleted,
    ResultResolved,
    TargetReached,
    PluginLoaded,
    PluginActive,
    Completed,
}

impl SessionStage {
    /// Position in stage order, used for monotonicity checks
    pub fn order(self) -> u8 {
        match self {
            SessionStage::Created => 0,
            SessionStage::SearchInitiated => 1,
            SessionStage::SearchCompleted => 2,
            SessionStage::ResultResolved => 3,
            SessionStage::TargetReached => 4,
            SessionStage::PluginLoaded => 5,
            SessionStage::PluginActive => 6,
            SessionStage::Completed => 7,
        }
    }
}

/// Terminal outcome of a session.
///
/// `Partial` means the session reached the target site but never confirmed
/// plugin activation, which is still a meaningful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Partial,
    Failed,
    TimedOut,
}

/// What the search step resolved to: a clicked result link, or the sentinel
/// for "target not present in results" (direct navigation was used).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum ResolvedResult {
    Clicked(String),
    NotFound,
}

impl std::fmt::Display for ResolvedResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedResult::Clicked(url) => write!(f, "clicked:{}", url),
            ResolvedResult::NotFound => write!(f, "not_found"),
        }
    }
}

/// Stage-progress events reported from outside the engine (the reporting
/// agent embedded in the automation target). Unknown names are a client
/// error at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    GoogleSearchCompleted,
    GoogleResultClicked,
    TargetSiteReached,
    PluginLoaded,
    PluginActive,
}

impl SessionEvent {
    /// The stage this event advances the session to
    pub fn target_stage(self) -> SessionStage {
        match self {
            SessionEvent::GoogleSearchCompleted => SessionStage::SearchCompleted,
            SessionEvent::GoogleResultClicked => SessionStage::ResultResolved,
            SessionEvent::TargetSiteReached => SessionStage::TargetReached,
            SessionEvent::PluginLoaded => SessionStage::PluginLoaded,
            SessionEvent::PluginActive => SessionStage::PluginActive,
        }
    }
}

impl std::str::FromStr for SessionEvent {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_search_completed" => Ok(SessionEvent::GoogleSearchCompleted),
            "google_result_clicked" => Ok(SessionEvent::GoogleResultClicked),
            "target_site_reached" => Ok(SessionEvent::TargetSiteReached),
            "plugin_loaded" => Ok(SessionEvent::PluginLoaded),
            "plugin_active" => Ok(SessionEvent::PluginActive),
            other => Err(EngineError::Client(format!("invalid event type: {}", other))),
        }
    }
}

/// Result of applying a stage advance to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTransition {
    /// The session moved forward one stage
    Advanced,
    /// Duplicate delivery for a stage already reached; accepted as a no-op
    AlreadyReached,
    /// Forward jump skipping a stage, or an advance after a terminal
    /// outcome; not applied
    Rejected,
}

/// One recorded stage arrival
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage: SessionStage,
    pub at: DateTime<Utc>,
}

/// One simulated visitor's end-to-end journey.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSession {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub stage: SessionStage,
    /// Append-only stage arrivals; timestamps are non-decreasing in stage
    /// order
    pub stage_history: Vec<StageRecord>,
    pub resolved_result: Option<ResolvedResult>,
    /// Extension identifier reported with the plugin_loaded signal
    pub extension_id: Option<String>,
    pub outcome: Option<SessionOutcome>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BotSession {
    /// Create a fresh session owned by `campaign_id`
    pub fn new(campaign_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            stage: SessionStage::Created,
            stage_history: vec![StageRecord {
                stage: SessionStage::Created,
                at: now,
            }],
            resolved_result: None,
            extension_id: None,
            outcome: None,
            error_message: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Whether the session already carries a terminal outcome
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Timestamp of the most recent stage arrival
    fn last_stage_at(&self) -> DateTime<Utc> {
        self.stage_history
            .last()
            .map(|r| r.at)
            .unwrap_or(self.created_at)
    }

    /// Advance to `stage`, idempotently.
    ///
    /// Exactly one step forward is applied; a stage at or before the
    /// current one is a duplicate no-op; anything further ahead (or any
    /// advance after a terminal outcome) is rejected.
    pub fn advance(&mut self, stage: SessionStage, now: DateTime<Utc>) -> StageTransition {
        if stage.order() <= self.stage.order() {
            return StageTransition::AlreadyReached;
        }
        if self.is_terminal() || stage.order() != self.stage.order() + 1 {
            return StageTransition::Rejected;
        }

        // Clamp so history timestamps never decrease even if the reporter's
        // clock is behind ours
        let at = now.max(self.last_stage_at());
        self.stage = stage;
        self.stage_history.push(StageRecord { stage, at });

        if stage == SessionStage::Completed {
            self.outcome = Some(SessionOutcome::Success);
            self.completed_at = Some(at);
        }

        StageTransition::Advanced
    }

    /// Apply an externally reported event.
    ///
    /// `plugin_active` arriving while the session sits at `plugin_loaded`
    /// also completes the session, since `plugin_active -> completed` is
    /// immediate.
    pub fn apply_event(
        &mut self,
        event: SessionEvent,
        extension_id: Option<String>,
        now: DateTime<Utc>,
    ) -> StageTransition {
        if event == SessionEvent::PluginLoaded {
            if let Some(ext) = extension_id {
                self.extension_id.get_or_insert(ext);
            }
        }

        let transition = self.advance(event.target_stage(), now);

        if transition == StageTransition::Advanced && event == SessionEvent::PluginActive {
            self.advance(SessionStage::Completed, now);
        }

        transition
    }

    /// Record a terminal outcome. The first terminal outcome wins;
    /// re-marking is a no-op so duplicate failure paths cannot overwrite
    /// each other.
    pub fn mark_outcome(&mut self, outcome: SessionOutcome, error: Option<String>) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
            self.error_message = error;
            self.completed_at = Some(Utc::now());
        }
    }
}
