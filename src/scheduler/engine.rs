//! Campaign scheduler
//!
//! The top-level control loop. Each tick sweeps stuck sessions, examines
//! the active campaigns whose window permits activity, reserves this
//! tick's session quota per campaign, and hands the sessions to the pool.
//! Dispatch is fire-and-forget; the tick never waits on session
//! completion, and one campaign's failure never touches the others.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::campaign::{Campaign, CampaignStore};
use crate::error::EngineError;
use crate::proxy::ProxyResolver;
use crate::session::{SessionPool, SessionStore};
use crate::stats::EngineStats;

/// Scheduler configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Sessions running longer than this are swept to `timed_out`
    pub stuck_session_max_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stuck_session_max_secs: 300,
        }
    }
}

/// What happened to one campaign during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// Sessions were handed to the pool
    Dispatched,
    /// Volume goal met and nothing left in flight
    Completed,
    /// Volume goal met; waiting for in-flight sessions to finish
    WaitingForCompletion,
    /// The scheduling window does not currently permit activity
    OutsideWindow,
    /// No usable automation endpoint this tick; retried next tick
    ResolverUnavailable,
    /// Campaign-level error; recorded, does not affect other campaigns
    Error,
}

/// Per-campaign tick result
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignTickResult {
    pub campaign_id: Uuid,
    pub outcome: TickOutcome,
    pub sessions_dispatched: u32,
    pub message: Option<String>,
}

/// Summary of one scheduler tick
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub campaigns_examined: usize,
    pub sessions_dispatched: u32,
    pub stuck_sessions_swept: u32,
    pub results: Vec<CampaignTickResult>,
}

/// Top-level campaign control loop
pub struct CampaignScheduler {
    campaigns: Arc<CampaignStore>,
    sessions: Arc<SessionStore>,
    resolver: Arc<ProxyResolver>,
    pool: Arc<SessionPool>,
    stats: Arc<EngineStats>,
    config: SchedulerConfig,
}

impl CampaignScheduler {
    pub fn new(
        campaigns: Arc<CampaignStore>,
        sessions: Arc<SessionStore>,
        resolver: Arc<ProxyResolver>,
        pool: Arc<SessionPool>,
        stats: Arc<EngineStats>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            campaigns,
            sessions,
            resolver,
            pool,
            stats,
            config,
        }
    }

    /// Run one scheduling pass. Dispatches and returns; never blocks on
    /// session completion.
    pub async fn tick(&self) -> TickSummary {
        self.stats.record_tick();

        let swept = self
            .sessions
            .sweep_stuck(Duration::from_secs(self.config.stuck_session_max_secs));

        let active = self.campaigns.active();
        info!("Scheduler tick: {} active campaigns", active.len());

        let mut results = Vec::with_capacity(active.len());
        let mut total_dispatched = 0;

        for campaign in &active {
            let result = self.process_campaign(campaign).await;
            total_dispatched += result.sessions_dispatched;
            results.push(result);
        }

        self.stats.record_dispatched(total_dispatched as u64);

        TickSummary {
            campaigns_examined: active.len(),
            sessions_dispatched: total_dispatched,
            stuck_sessions_swept: swept,
            results,
        }
    }

    /// Activate a campaign and run an immediate tick so activation is felt
    /// without waiting for the periodic trigger.
    pub async fn activate_campaign(
        &self,
        campaign_id: &Uuid,
    ) -> Result<(Campaign, TickSummary), EngineError> {
        let campaign = self.campaigns.activate(campaign_id)?;
        let summary = self.tick().await;
        Ok((campaign, summary))
    }

    async fn process_campaign(&self, campaign: &Campaign) -> CampaignTickResult {
        let result = |outcome, dispatched, message: Option<String>| CampaignTickResult {
            campaign_id: campaign.id,
            outcome,
            sessions_dispatched: dispatched,
            message,
        };

        if !campaign.window.is_within_schedule() {
            return result(TickOutcome::OutsideWindow, 0, None);
        }

        if campaign.remaining_sessions() == 0 {
            let running = self.sessions.running_count(&campaign.id);
            if running == 0 {
                self.campaigns.complete(&campaign.id);
                return result(TickOutcome::Completed, 0, None);
            }
            return result(
                TickOutcome::WaitingForCompletion,
                0,
                Some(format!("{} sessions still running", running)),
            );
        }

        // Resolve before reserving quota: an unavailable endpoint must not
        // burn volume, only skip this tick
        let handle = match self.resolver.resolve(&campaign.owner_id).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Campaign {} dispatch skipped: {}", campaign.id, e);
                self.campaigns.record_error(&campaign.id, &e.to_string());
                return result(TickOutcome::ResolverUnavailable, 0, Some(e.to_string()));
            }
        };

        let quota = match self.campaigns.reserve_quota(&campaign.id) {
            Ok(q) => q,
            Err(e) => {
                self.campaigns.record_error(&campaign.id, &e.to_string());
                return result(TickOutcome::Error, 0, Some(e.to_string()));
            }
        };

        if quota == 0 {
            // Status changed under us (e.g. paused between the snapshot
            // and the reservation); dispatch nothing
            return result(TickOutcome::OutsideWindow, 0, None);
        }

        info!(
            "Campaign {}: dispatching {} sessions ({}/{} created)",
            campaign.id,
            quota,
            campaign.sessions_created + quota,
            campaign.total_sessions
        );

        self.pool.dispatch(campaign, &handle, quota);
        result(TickOutcome::Dispatched, quota, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::browser::{AutomationDriver, DriverError};
    use crate::campaign::{CampaignStatus, NewCampaign};
    use crate::proxy::{EndpointProber, ProxyConfig, ProxyHandle};
    use crate::rate::RetryPolicy;
    use crate::scheduler::ScheduleWindow;
    use crate::session::{DriverFactory, RunnerConfig, SessionRunner};

    struct AlwaysHealthy;

    #[async_trait]
    impl EndpointProber for AlwaysHealthy {
        async fn probe(&self, _config: &ProxyConfig, _timeout: Duration) -> bool {
            true
        }
    }

    /// Driver that completes the browsing steps instantly
    struct InstantDriver;

    #[async_trait]
    impl AutomationDriver for InstantDriver {
        async fn search(&self, _keyword: &str, _timeout: Duration) -> Result<Vec<String>, DriverError> {
            Ok(vec!["https://target.com/".into()])
        }

        async fn click(&self, _url: &str, _timeout: Duration) -> Result<String, DriverError> {
            Ok("https://target.com/".into())
        }

        async fn navigate(&self, _url: &str, _timeout: Duration) -> Result<String, DriverError> {
            Ok("https://target.com/".into())
        }

        async fn health(&self, _timeout: Duration) -> Result<(), DriverError> {
            Ok(())
        }
    }

    struct InstantFactory;

    impl DriverFactory for InstantFactory {
        fn create(&self, _handle: &ProxyHandle) -> Result<Arc<dyn AutomationDriver>, DriverError> {
            Ok(Arc::new(InstantDriver))
        }
    }

    struct Harness {
        campaigns: Arc<CampaignStore>,
        sessions: Arc<SessionStore>,
        scheduler: CampaignScheduler,
    }

    fn harness(proxy_configs: Vec<ProxyConfig>) -> Harness {
        let campaigns = Arc::new(CampaignStore::new());
        let sessions = Arc::new(SessionStore::new());
        let stats = Arc::new(EngineStats::new());

        let resolver = Arc::new(ProxyResolver::new(
            Arc::new(AlwaysHealthy),
            Duration::from_secs(1),
            Duration::from_secs(60),
        ));
        resolver.load(proxy_configs);

        let runner = Arc::new(SessionRunner::new(
            sessions.clone(),
            RunnerConfig {
                search_timeout_secs: 1,
                navigation_timeout_secs: 1,
                signal_timeout_secs: 0,
                retry: RetryPolicy {
                    max_attempts: 1,
                    base_delay_ms: 1,
                    max_delay_ms: 1,
                },
            },
        ));
        let pool = Arc::new(SessionPool::new(
            8,
            sessions.clone(),
            runner,
            stats.clone(),
            Arc::new(InstantFactory),
        ));

        let scheduler = CampaignScheduler::new(
            campaigns.clone(),
            sessions.clone(),
            resolver,
            pool,
            stats,
            SchedulerConfig::default(),
        );

        Harness {
            campaigns,
            sessions,
            scheduler,
        }
    }

    fn proxy_config(owner: Uuid) -> ProxyConfig {
        ProxyConfig {
            owner_id: owner,
            enabled: true,
            customer_id: "cust".into(),
            zone: "z".into(),
            password: "pw".into(),
            host: "endpoint".into(),
            port: 9222,
            priority: 0,
        }
    }

    fn new_campaign(owner: Uuid, total: u32, per_tick: u32) -> NewCampaign {
        NewCampaign {
            name: "t".into(),
            owner_id: owner,
            target_url: "https://target.com/".into(),
            search_keyword: "target".into(),
            total_sessions: total,
            sessions_per_tick: per_tick,
            window: ScheduleWindow::default(),
        }
    }

    async fn wait_for_no_running(h: &Harness, campaign_id: &Uuid) {
        for _ in 0..100 {
            if h.sessions.running_count(campaign_id) == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("sessions never drained");
    }

    #[tokio::test]
    async fn test_volume_never_exceeds_total_over_many_ticks() {
        let owner = Uuid::new_v4();
        let h = harness(vec![proxy_config(owner)]);
        let id = h
            .campaigns
            .insert(Campaign::from_request(new_campaign(owner, 10, 4)));
        h.campaigns.activate(&id).unwrap();

        let mut dispatched = 0;
        for _ in 0..6 {
            let summary = h.scheduler.tick().await;
            dispatched += summary.sessions_dispatched;
        }

        assert_eq!(dispatched, 10);
        assert_eq!(h.campaigns.get(&id).unwrap().sessions_created, 10);
    }

    #[tokio::test]
    async fn test_completes_once_sessions_drain() {
        let owner = Uuid::new_v4();
        let h = harness(vec![proxy_config(owner)]);
        let id = h
            .campaigns
            .insert(Campaign::from_request(new_campaign(owner, 3, 3)));
        h.campaigns.activate(&id).unwrap();

        let summary = h.scheduler.tick().await;
        assert_eq!(summary.sessions_dispatched, 3);

        wait_for_no_running(&h, &id).await;

        let summary = h.scheduler.tick().await;
        assert_eq!(summary.results[0].outcome, TickOutcome::Completed);
        assert_eq!(
            h.campaigns.get(&id).unwrap().status,
            CampaignStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_resolver_unavailable_skips_without_burning_quota() {
        let owner = Uuid::new_v4();
        // No proxy configs loaded for this owner
        let h = harness(vec![]);
        let id = h
            .campaigns
            .insert(Campaign::from_request(new_campaign(owner, 10, 4)));
        h.campaigns.activate(&id).unwrap();

        let summary = h.scheduler.tick().await;

        assert_eq!(summary.sessions_dispatched, 0);
        assert_eq!(summary.results[0].outcome, TickOutcome::ResolverUnavailable);

        let campaign = h.campaigns.get(&id).unwrap();
        assert_eq!(campaign.sessions_created, 0);
        assert!(campaign.last_error.is_some());
        // Still active: retried next tick
        assert_eq!(campaign.status, CampaignStatus::Active);
    }

    #[tokio::test]
    async fn test_one_campaign_failure_does_not_block_others() {
        let healthy_owner = Uuid::new_v4();
        let broken_owner = Uuid::new_v4();
        let h = harness(vec![proxy_config(healthy_owner)]);

        let broken = h
            .campaigns
            .insert(Campaign::from_request(new_campaign(broken_owner, 5, 5)));
        let healthy = h
            .campaigns
            .insert(Campaign::from_request(new_campaign(healthy_owner, 5, 5)));
        h.campaigns.activate(&broken).unwrap();
        h.campaigns.activate(&healthy).unwrap();

        let summary = h.scheduler.tick().await;

        assert_eq!(summary.campaigns_examined, 2);
        assert_eq!(summary.sessions_dispatched, 5);
        assert_eq!(h.campaigns.get(&healthy).unwrap().sessions_created, 5);
        assert_eq!(h.campaigns.get(&broken).unwrap().sessions_created, 0);
    }

    #[tokio::test]
    async fn test_outside_window_dispatches_nothing() {
        let owner = Uuid::new_v4();
        let h = harness(vec![proxy_config(owner)]);

        let mut request = new_campaign(owner, 10, 5);
        request.window = ScheduleWindow {
            enabled: true,
            days: vec![], // never
            ..Default::default()
        };
        let id = h.campaigns.insert(Campaign::from_request(request));
        h.campaigns.activate(&id).unwrap();

        let summary = h.scheduler.tick().await;

        assert_eq!(summary.results[0].outcome, TickOutcome::OutsideWindow);
        assert_eq!(h.campaigns.get(&id).unwrap().sessions_created, 0);
    }

    #[tokio::test]
    async fn test_paused_campaign_not_examined() {
        let owner = Uuid::new_v4();
        let h = harness(vec![proxy_config(owner)]);
        let id = h
            .campaigns
            .insert(Campaign::from_request(new_campaign(owner, 10, 5)));
        h.campaigns.activate(&id).unwrap();
        h.campaigns.pause(&id).unwrap();

        let summary = h.scheduler.tick().await;
        assert_eq!(summary.campaigns_examined, 0);
        assert_eq!(summary.sessions_dispatched, 0);
    }

    #[tokio::test]
    async fn test_activate_campaign_runs_immediate_tick() {
        let owner = Uuid::new_v4();
        let h = harness(vec![proxy_config(owner)]);
        let id = h
            .campaigns
            .insert(Campaign::from_request(new_campaign(owner, 6, 4)));

        let (campaign, summary) = h.scheduler.activate_campaign(&id).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Active);
        assert_eq!(summary.sessions_dispatched, 4);

        // Second activation is a client error and does not dispatch again
        let err = h.scheduler.activate_campaign(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Client(_)));
        assert_eq!(h.campaigns.get(&id).unwrap().sessions_created, 4);
    }
}
