//! Session pool
//!
//! Bounded-concurrency executor for bot sessions. Dispatch returns as soon
//! as the tasks are spawned; a semaphore caps how many sessions are
//! actually driving the shared automation endpoint at once.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::{AutomationDriver, DriverError, HttpDriver};
use crate::campaign::Campaign;
use crate::proxy::ProxyHandle;
use crate::session::{SessionOutcome, SessionRunner, SessionStore};
use crate::stats::EngineStats;

/// Builds the per-session automation driver from a resolved handle.
/// Each session gets its own upstream identity; connections are never
/// shared between sessions.
pub trait DriverFactory: Send + Sync {
    fn create(&self, handle: &ProxyHandle) -> Result<Arc<dyn AutomationDriver>, DriverError>;
}

/// Production factory: HTTP driver against the resolved endpoint
pub struct HttpDriverFactory;

impl DriverFactory for HttpDriverFactory {
    fn create(&self, handle: &ProxyHandle) -> Result<Arc<dyn AutomationDriver>, DriverError> {
        let driver = HttpDriver::new(
            &handle.endpoint_url(),
            &handle.session_username(),
            handle.password(),
        )?;
        Ok(Arc::new(driver))
    }
}

/// Bounded executor that runs many session runners per scheduler tick.
pub struct SessionPool {
    semaphore: Arc<Semaphore>,
    store: Arc<SessionStore>,
    runner: Arc<SessionRunner>,
    stats: Arc<EngineStats>,
    driver_factory: Arc<dyn DriverFactory>,
}

impl SessionPool {
    pub fn new(
        max_concurrent: usize,
        store: Arc<SessionStore>,
        runner: Arc<SessionRunner>,
        stats: Arc<EngineStats>,
        driver_factory: Arc<dyn DriverFactory>,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            store,
            runner,
            stats,
            driver_factory,
        }
    }

    /// Create `count` sessions for the campaign and spawn a task per
    /// session. Does not wait for any of them; returns the created ids.
    pub fn dispatch(&self, campaign: &Campaign, handle: &ProxyHandle, count: u32) -> Vec<Uuid> {
        let mut session_ids = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let session_id = self.store.create(campaign.id);
            session_ids.push(session_id);
            self.spawn_session_task(session_id, campaign.clone(), handle.clone());
        }

        info!(
            "Dispatched {} sessions for campaign {} ({} in flight)",
            session_ids.len(),
            campaign.id,
            self.stats.in_flight()
        );

        session_ids
    }

    /// Spawn one session task with panic safety: a panicking runner still
    /// releases its slot, records a failed outcome, and never takes the
    /// pool down with it.
    fn spawn_session_task(&self, session_id: Uuid, campaign: Campaign, handle: ProxyHandle) {
        let semaphore = self.semaphore.clone();
        let store = self.store.clone();
        let runner = self.runner.clone();
        let stats = self.stats.clone();
        let driver_factory = self.driver_factory.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Semaphore closed: engine is shutting down
                    return;
                }
            };

            stats.session_started();

            let driver = match driver_factory.create(&handle) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Session {} could not create driver: {}", session_id, e);
                    store.mark_outcome(
                        &session_id,
                        SessionOutcome::Failed,
                        Some(format!("driver setup failed: {}", e)),
                    );
                    stats.session_finished(SessionOutcome::Failed);
                    return;
                }
            };

            let run = std::panic::AssertUnwindSafe(runner.run(session_id, &campaign, driver));

            match run.catch_unwind().await {
                Ok(outcome) => {
                    stats.session_finished(outcome);
                }
                Err(panic_info) => {
                    let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };

                    error!("Session {} panicked: {}. Cleaning up.", session_id, panic_msg);
                    store.mark_outcome(
                        &session_id,
                        SessionOutcome::Failed,
                        Some(format!("session task panicked: {}", panic_msg)),
                    );
                    stats.session_finished(SessionOutcome::Failed);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::campaign::NewCampaign;
    use crate::proxy::ProxyConfig;
    use crate::rate::RetryPolicy;
    use crate::scheduler::ScheduleWindow;
    use crate::session::RunnerConfig;

    /// Driver that tracks how many sessions hold it concurrently
    struct SlowDriver {
        current: AtomicU32,
        max_seen: AtomicU32,
    }

    impl SlowDriver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicU32::new(0),
                max_seen: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl AutomationDriver for SlowDriver {
        async fn search(&self, _keyword: &str, _timeout: Duration) -> Result<Vec<String>, DriverError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
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

    struct SharedDriverFactory {
        driver: Arc<SlowDriver>,
    }

    impl DriverFactory for SharedDriverFactory {
        fn create(&self, _handle: &ProxyHandle) -> Result<Arc<dyn AutomationDriver>, DriverError> {
            Ok(self.driver.clone())
        }
    }

    fn campaign() -> Campaign {
        Campaign::from_request(NewCampaign {
            name: "pool-test".into(),
            owner_id: Uuid::new_v4(),
            target_url: "https://target.com/".into(),
            search_keyword: "target".into(),
            total_sessions: 20,
            sessions_per_tick: 10,
            window: ScheduleWindow::default(),
        })
    }

    fn handle() -> ProxyHandle {
        ProxyHandle::for_tests(ProxyConfig {
            owner_id: Uuid::new_v4(),
            enabled: true,
            customer_id: "cust".into(),
            zone: "z".into(),
            password: "pw".into(),
            host: "endpoint".into(),
            port: 9222,
            priority: 0,
        })
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let store = Arc::new(SessionStore::new());
        let runner = Arc::new(SessionRunner::new(
            store.clone(),
            RunnerConfig {
                search_timeout_secs: 5,
                navigation_timeout_secs: 5,
                signal_timeout_secs: 0,
                retry: RetryPolicy {
                    max_attempts: 1,
                    base_delay_ms: 1,
                    max_delay_ms: 1,
                },
            },
        ));
        let stats = Arc::new(EngineStats::new());
        let driver = SlowDriver::new();
        let pool = SessionPool::new(
            2,
            store.clone(),
            runner,
            stats.clone(),
            Arc::new(SharedDriverFactory {
                driver: driver.clone(),
            }),
        );

        let campaign = campaign();
        let ids = pool.dispatch(&campaign, &handle(), 6);
        assert_eq!(ids.len(), 6);

        // Wait until every session reaches a terminal outcome
        for _ in 0..100 {
            if ids.iter().all(|id| store.get(id).unwrap().is_terminal()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(ids.iter().all(|id| store.get(id).unwrap().is_terminal()));
        assert!(driver.max_seen.load(Ordering::SeqCst) <= 2);
        assert_eq!(stats.in_flight(), 0);
        // Signal timeout of zero: sessions reach the target and end partial
        assert_eq!(stats.snapshot().partial, 6);
    }
}
