//! Proxy resolution module
//!
//! Resolves a campaign owner to a healthy automation endpoint with
//! credentials, or reports unavailability so the scheduler skips dispatch.
//! Handles mint a unique per-session username suffix so no two sessions
//! share a browser connection upstream.

mod config;

pub use config::ProxyConfig;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use moka::future::Cache;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::{AutomationDriver, HttpDriver};
use crate::error::EngineError;

/// Global atomic counter for unique per-session usernames (thread-safe)
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A resolved, health-checked automation endpoint.
///
/// Cheap to clone; `session_username()` mints a fresh suffix per call so
/// each bot session gets its own upstream identity.
#[derive(Debug, Clone)]
pub struct ProxyHandle {
    config: ProxyConfig,
    /// Base seed for session suffix generation
    base_seed: u64,
}

impl ProxyHandle {
    fn new(config: ProxyConfig) -> Self {
        // Seed from timestamp and process ID so restarts do not reuse
        // suffixes the provider may still consider live
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let pid = std::process::id() as u64;
        let base_seed = (timestamp % 1_000_000) * 1_000_000 + (pid % 1_000_000);

        Self { config, base_seed }
    }

    pub fn endpoint_url(&self) -> String {
        self.config.endpoint_url()
    }

    pub fn password(&self) -> &str {
        &self.config.password
    }

    #[cfg(test)]
    pub(crate) fn for_tests(config: ProxyConfig) -> Self {
        Self::new(config)
    }

    /// Username with a unique `-session-{n}` suffix
    pub fn session_username(&self) -> String {
        let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        let sessid = self.base_seed + counter;
        format!("{}-session-{}", self.config.username(), sessid)
    }

    /// Full credentialed connection URL for one session:
    /// `http://{session_username}:{password}@{host}:{port}`
    pub fn session_connection_url(&self) -> String {
        let password_encoded = urlencoding::encode(&self.config.password);
        format!(
            "http://{}:{}@{}:{}",
            self.session_username(),
            password_encoded,
            self.config.host,
            self.config.port
        )
    }
}

/// Health probe against an automation endpoint.
#[async_trait]
pub trait EndpointProber: Send + Sync {
    async fn probe(&self, config: &ProxyConfig, timeout: Duration) -> bool;
}

/// Probes by issuing the driver's `health` command.
pub struct HttpProber;

#[async_trait]
impl EndpointProber for HttpProber {
    async fn probe(&self, config: &ProxyConfig, timeout: Duration) -> bool {
        let driver = match HttpDriver::new(
            &config.endpoint_url(),
            &config.username(),
            &config.password,
        ) {
            Ok(d) => d,
            Err(e) => {
                warn!("Probe client for {} failed: {}", config.endpoint_url(), e);
                return false;
            }
        };

        match driver.health(timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Health probe for {} failed: {}", config.endpoint_url(), e);
                false
            }
        }
    }
}

/// Resolves owners to healthy automation endpoints.
pub struct ProxyResolver {
    configs: RwLock<HashMap<Uuid, Vec<ProxyConfig>>>,
    prober: Arc<dyn EndpointProber>,
    /// Probe results cached briefly so a tick fanning out many sessions
    /// does not hammer the endpoint
    probe_cache: Cache<String, bool>,
    probe_timeout: Duration,
}

impl ProxyResolver {
    pub fn new(prober: Arc<dyn EndpointProber>, probe_timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            prober,
            probe_cache: Cache::builder().time_to_live(cache_ttl).build(),
            probe_timeout,
        }
    }

    /// Replace the known configuration records. The engine reads these from
    /// configuration storage; it never writes them back.
    pub fn load(&self, records: Vec<ProxyConfig>) {
        let mut map: HashMap<Uuid, Vec<ProxyConfig>> = HashMap::new();
        for record in records {
            map.entry(record.owner_id).or_default().push(record);
        }
        for configs in map.values_mut() {
            configs.sort_by_key(|c| c.priority);
        }

        let total: usize = map.values().map(|v| v.len()).sum();
        info!("Loaded {} proxy configs for {} owners", total, map.len());
        *self.configs.write() = map;
    }

    /// Usable configs for an owner, in priority order
    fn usable_configs(&self, owner_id: &Uuid) -> Vec<ProxyConfig> {
        self.configs
            .read()
            .get(owner_id)
            .map(|configs| configs.iter().filter(|c| c.is_usable()).cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve a healthy endpoint for the owner.
    ///
    /// Tries each enabled config in priority order and returns the first
    /// one that passes a bounded-timeout health probe. Failing early here
    /// is deliberate: a dead endpoint discovered mid-session is far more
    /// expensive than a skipped tick.
    pub async fn resolve(&self, owner_id: &Uuid) -> Result<ProxyHandle, EngineError> {
        let candidates = self.usable_configs(owner_id);

        if candidates.is_empty() {
            return Err(EngineError::ResourceUnavailable(format!(
                "no enabled proxy configuration for owner {}",
                owner_id
            )));
        }

        for config in candidates {
            let key = format!("{}|{}", config.endpoint_url(), config.username());
            let prober = self.prober.clone();
            let probe_timeout = self.probe_timeout;
            let probe_config = config.clone();

            let healthy = self
                .probe_cache
                .get_with(key, async move { prober.probe(&probe_config, probe_timeout).await })
                .await;

            if healthy {
                debug!(
                    "Resolved owner {} to endpoint {}",
                    owner_id,
                    config.endpoint_url()
                );
                return Ok(ProxyHandle::new(config));
            }
        }

        Err(EngineError::ResourceUnavailable(format!(
            "health probe failed for all enabled configurations of owner {}",
            owner_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Prober that reports health per endpoint host
    struct StubProber {
        healthy_hosts: Vec<String>,
    }

    #[async_trait]
    impl EndpointProber for StubProber {
        async fn probe(&self, config: &ProxyConfig, _timeout: Duration) -> bool {
            self.healthy_hosts.contains(&config.host)
        }
    }

    fn config(owner: Uuid, host: &str, enabled: bool, priority: u32) -> ProxyConfig {
        ProxyConfig {
            owner_id: owner,
            enabled,
            customer_id: "cust".into(),
            zone: "zone1".into(),
            password: "pw".into(),
            host: host.into(),
            port: 9222,
            priority,
        }
    }

    fn resolver(healthy_hosts: &[&str]) -> ProxyResolver {
        ProxyResolver::new(
            Arc::new(StubProber {
                healthy_hosts: healthy_hosts.iter().map(|s| s.to_string()).collect(),
            }),
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_no_configs_is_unavailable() {
        let r = resolver(&["a"]);
        let err = r.resolve(&Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EngineError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_disabled_config_is_never_returned() {
        let owner = Uuid::new_v4();
        let r = resolver(&["a"]);
        r.load(vec![config(owner, "a", false, 0)]);

        let err = r.resolve(&owner).await.unwrap_err();
        assert!(matches!(err, EngineError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_all_probes_failing_is_unavailable() {
        let owner = Uuid::new_v4();
        let r = resolver(&[]);
        r.load(vec![config(owner, "a", true, 0), config(owner, "b", true, 1)]);

        let err = r.resolve(&owner).await.unwrap_err();
        assert!(matches!(err, EngineError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_failover_to_next_priority() {
        let owner = Uuid::new_v4();
        let r = resolver(&["b"]);
        r.load(vec![config(owner, "a", true, 0), config(owner, "b", true, 1)]);

        let handle = r.resolve(&owner).await.unwrap();
        assert_eq!(handle.endpoint_url(), "http://b:9222");
    }

    #[tokio::test]
    async fn test_priority_order_wins_when_both_healthy() {
        let owner = Uuid::new_v4();
        let r = resolver(&["a", "b"]);
        r.load(vec![config(owner, "b", true, 5), config(owner, "a", true, 1)]);

        let handle = r.resolve(&owner).await.unwrap();
        assert_eq!(handle.endpoint_url(), "http://a:9222");
    }

    #[test]
    fn test_connection_url_encodes_password() {
        let mut cfg = config(Uuid::new_v4(), "a", true, 0);
        cfg.password = "p@ss w".into();
        let handle = ProxyHandle::new(cfg);

        let url = handle.session_connection_url();
        assert!(url.starts_with("http://brd-customer-cust-zone-zone1-session-"));
        assert!(url.contains(":p%40ss%20w@a:9222"));
    }

    #[test]
    fn test_session_usernames_are_unique() {
        let handle = ProxyHandle::new(config(Uuid::new_v4(), "a", true, 0));

        let names: std::collections::HashSet<String> =
            (0..100).map(|_| handle.session_username()).collect();
        assert_eq!(names.len(), 100);
        assert!(names
            .iter()
            .all(|n| n.starts_with("brd-customer-cust-zone-zone1-session-")));
    }
}
