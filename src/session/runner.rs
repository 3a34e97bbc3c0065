//! Session runner
//!
//! Drives one bot session through its state machine by issuing automation
//! commands and recording stage transitions in the session store. Owns the
//! per-step timeouts and bounded retries; a failure or timeout in any step
//! absorbs the session into its terminal outcome without touching siblings.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::{match_result, AutomationDriver, DriverError, MatchResult};
use crate::campaign::Campaign;
use crate::rate::RetryPolicy;
use crate::session::{ResolvedResult, SessionOutcome, SessionStage, SessionStore};

/// Per-step timeout and retry configuration for session runs
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Timeout for the search command returning candidate links
    pub search_timeout_secs: u64,
    /// Timeout for click/navigate commands reaching the target
    pub navigation_timeout_secs: u64,
    /// How long to wait for each externally reported plugin signal
    pub signal_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            search_timeout_secs: 30,
            navigation_timeout_secs: 60,
            signal_timeout_secs: 45,
            retry: RetryPolicy::default(),
        }
    }
}

impl RunnerConfig {
    fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    fn signal_timeout(&self) -> Duration {
        Duration::from_secs(self.signal_timeout_secs)
    }
}

/// How a remote step ultimately failed after retries
enum StepFailure {
    Failed(String),
    TimedOut(String),
}

impl StepFailure {
    fn outcome(&self) -> SessionOutcome {
        match self {
            StepFailure::Failed(_) => SessionOutcome::Failed,
            StepFailure::TimedOut(_) => SessionOutcome::TimedOut,
        }
    }

    fn message(self) -> String {
        match self {
            StepFailure::Failed(m) | StepFailure::TimedOut(m) => m,
        }
    }
}

/// Drives sessions through search, result resolution, arrival, and the
/// plugin signal waits.
pub struct SessionRunner {
    store: Arc<SessionStore>,
    config: RunnerConfig,
}

impl SessionRunner {
    pub fn new(store: Arc<SessionStore>, config: RunnerConfig) -> Self {
        Self { store, config }
    }

    /// Run one session to a terminal outcome. The outcome is recorded in
    /// the store before this returns.
    pub async fn run(
        &self,
        session_id: Uuid,
        campaign: &Campaign,
        driver: Arc<dyn AutomationDriver>,
    ) -> SessionOutcome {
        let target_host = match campaign.target_host() {
            Some(host) => host,
            None => {
                let msg = format!("campaign target URL is not parseable: {}", campaign.target_url);
                return self.finish(&session_id, SessionOutcome::Failed, msg);
            }
        };

        info!(
            "Session {} starting for campaign {} (keyword: '{}', target: {})",
            session_id, campaign.id, campaign.search_keyword, target_host
        );

        // created -> search_initiated -> search_completed
        let candidates = match self.run_search(&session_id, &campaign.search_keyword, &driver).await {
            Ok(links) => links,
            Err(failure) => {
                let outcome = failure.outcome();
                return self.finish(&session_id, outcome, failure.message());
            }
        };

        // search_completed -> result_resolved
        let final_url = match match_result(&candidates, &target_host) {
            MatchResult::Clicked(url) => {
                info!("Session {} clicking result {}", session_id, url);
                self.store
                    .set_resolved_result(&session_id, ResolvedResult::Clicked(url.clone()));
                let _ = self.store.advance(&session_id, SessionStage::ResultResolved);

                match self.run_navigation(&session_id, &driver, NavKind::Click, &url).await {
                    Ok(final_url) => final_url,
                    Err(failure) => {
                        return self.finish(&session_id, SessionOutcome::Failed, failure.message())
                    }
                }
            }
            MatchResult::NotFound => {
                info!(
                    "Session {} target not in {} results, navigating directly",
                    session_id,
                    candidates.len()
                );
                self.store
                    .set_resolved_result(&session_id, ResolvedResult::NotFound);
                let _ = self.store.advance(&session_id, SessionStage::ResultResolved);

                match self
                    .run_navigation(&session_id, &driver, NavKind::Navigate, &campaign.target_url)
                    .await
                {
                    Ok(final_url) => final_url,
                    Err(failure) => {
                        return self.finish(&session_id, SessionOutcome::Failed, failure.message())
                    }
                }
            }
        };

        // result_resolved -> target_reached: verify we actually arrived
        let arrived_host = url::Url::parse(&final_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .map(|h| h.strip_prefix("www.").unwrap_or(&h).to_string());

        if arrived_host.as_deref() != Some(target_host.as_str()) {
            let msg = format!(
                "arrived at {} instead of {}",
                arrived_host.as_deref().unwrap_or("<unparseable>"),
                target_host
            );
            return self.finish(&session_id, SessionOutcome::Failed, msg);
        }
        let _ = self.store.advance(&session_id, SessionStage::TargetReached);
        info!("Session {} reached target {}", session_id, target_host);

        // target_reached -> plugin_loaded: externally reported signal.
        // Reaching the target site is already a meaningful result, so a
        // missing signal ends the session as partial, not failed.
        if !self
            .store
            .wait_for_stage(&session_id, SessionStage::PluginLoaded, self.config.signal_timeout())
            .await
        {
            warn!("Session {} saw no plugin_loaded signal", session_id);
            return self.finish(
                &session_id,
                SessionOutcome::Partial,
                "plugin_loaded signal not received".into(),
            );
        }

        // plugin_loaded -> plugin_active, same timeout policy
        if !self
            .store
            .wait_for_stage(&session_id, SessionStage::PluginActive, self.config.signal_timeout())
            .await
        {
            warn!("Session {} saw no plugin_active signal", session_id);
            return self.finish(
                &session_id,
                SessionOutcome::Partial,
                "plugin_active signal not received".into(),
            );
        }

        // plugin_active -> completed is immediate; the event application
        // already completed the session, this is a no-op otherwise
        let _ = self.store.advance(&session_id, SessionStage::Completed);
        self.store
            .mark_outcome(&session_id, SessionOutcome::Success, None);
        info!("Session {} completed", session_id);
        SessionOutcome::Success
    }

    /// Issue the search command with bounded retries and record the first
    /// two stage transitions.
    async fn run_search(
        &self,
        session_id: &Uuid,
        keyword: &str,
        driver: &Arc<dyn AutomationDriver>,
    ) -> Result<Vec<String>, StepFailure> {
        let _ = self.store.advance(session_id, SessionStage::SearchInitiated);

        let mut attempt = 1;
        loop {
            match driver.search(keyword, self.config.search_timeout()).await {
                Ok(links) => {
                    let _ = self.store.advance(session_id, SessionStage::SearchCompleted);
                    return Ok(links);
                }
                Err(DriverError::Timeout(msg)) => {
                    // No results within the step timeout is terminal for
                    // the search step
                    return Err(StepFailure::TimedOut(format!("search timed out: {}", msg)));
                }
                Err(e) if attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    warn!(
                        "Session {} search attempt {}/{} failed: {} (retrying in {}ms)",
                        session_id,
                        attempt,
                        self.config.retry.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(StepFailure::Failed(format!(
                        "search failed after {} attempts: {}",
                        attempt, e
                    )));
                }
            }
        }
    }

    /// Click a matched result or navigate directly, with bounded retries.
    /// Returns the final page URL for the arrival check.
    async fn run_navigation(
        &self,
        session_id: &Uuid,
        driver: &Arc<dyn AutomationDriver>,
        kind: NavKind,
        url: &str,
    ) -> Result<String, StepFailure> {
        let timeout = self.config.navigation_timeout();

        let mut attempt = 1;
        loop {
            let result = match kind {
                NavKind::Click => driver.click(url, timeout).await,
                NavKind::Navigate => driver.navigate(url, timeout).await,
            };

            match result {
                Ok(final_url) => return Ok(final_url),
                Err(DriverError::Timeout(msg)) => {
                    return Err(StepFailure::Failed(format!(
                        "{} timed out: {}",
                        kind.name(),
                        msg
                    )));
                }
                Err(e) if attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    warn!(
                        "Session {} {} attempt {}/{} failed: {} (retrying in {}ms)",
                        session_id,
                        kind.name(),
                        attempt,
                        self.config.retry.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(StepFailure::Failed(format!(
                        "{} failed after {} attempts: {}",
                        kind.name(),
                        attempt,
                        e
                    )));
                }
            }
        }
    }

    /// Record the terminal outcome and return it
    fn finish(&self, session_id: &Uuid, outcome: SessionOutcome, message: String) -> SessionOutcome {
        match outcome {
            SessionOutcome::Success => {
                self.store.mark_outcome(session_id, outcome, None);
            }
            _ => {
                warn!("Session {} ended {:?}: {}", session_id, outcome, message);
                self.store.mark_outcome(session_id, outcome, Some(message));
            }
        }
        outcome
    }
}

#[derive(Clone, Copy)]
enum NavKind {
    Click,
    Navigate,
}

impl NavKind {
    fn name(self) -> &'static str {
        match self {
            NavKind::Click => "click",
            NavKind::Navigate => "navigate",
        }
    }
}
