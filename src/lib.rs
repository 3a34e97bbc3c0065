//! trafficforge
//!
//! Campaign scheduling and bot session orchestration: a scheduler
//! periodically fans out short-lived bot sessions per active campaign, each
//! driving a remote headless browser through a search, result click (or
//! direct-navigation fallback), arrival at the target site, and plugin
//! activation, with every stage reported as an event.

pub mod error;
pub mod campaign;
pub mod session;
pub mod browser;
pub mod proxy;
pub mod scheduler;
pub mod rate;
pub mod stats;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use campaign::CampaignStore;
use proxy::{HttpProber, ProxyConfig, ProxyResolver};
use scheduler::{CampaignScheduler, SchedulerConfig};
use session::{HttpDriverFactory, RunnerConfig, SessionPool, SessionRunner, SessionStore};
use stats::EngineStats;

/// Application configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Hard cap on simultaneously in-flight sessions across all campaigns
    pub max_concurrent_sessions: usize,

    /// Seconds between periodic scheduler ticks
    pub tick_interval_secs: u64,

    /// Per-step timeouts and retry policy for session runs
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Scheduler settings (stuck-session sweep)
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Timeout for the automation-endpoint health probe
    pub probe_timeout_secs: u64,

    /// How long a probe result stays cached
    pub probe_cache_ttl_secs: u64,

    /// Proxy/automation endpoint records, keyed by owner. The engine only
    /// reads these.
    #[serde(default)]
    pub proxy_configs: Vec<ProxyConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 10,
            tick_interval_secs: 60,
            runner: RunnerConfig::default(),
            scheduler: SchedulerConfig::default(),
            probe_timeout_secs: 10,
            probe_cache_ttl_secs: 30,
            proxy_configs: vec![],
        }
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("trafficforge").join("logs"))
}

impl AppConfig {
    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("trafficforge").join("config.json"))
    }

    /// Load config from file
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => {
                        match serde_json::from_str(&content) {
                            Ok(config) => {
                                info!("Loaded config from {:?}", path);
                                return config;
                            }
                            Err(e) => {
                                warn!("Failed to parse config file: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }
}

/// Application state shared across the engine
pub struct AppState {
    pub config: AppConfig,
    pub campaigns: Arc<CampaignStore>,
    pub sessions: Arc<SessionStore>,
    pub resolver: Arc<ProxyResolver>,
    pub stats: Arc<EngineStats>,
    pub scheduler: Arc<CampaignScheduler>,
}

impl AppState {
    /// Wire up the engine from configuration
    pub fn new(config: AppConfig) -> Self {
        let campaigns = Arc::new(CampaignStore::new());
        let sessions = Arc::new(SessionStore::new());
        let stats = Arc::new(EngineStats::new());

        let resolver = Arc::new(ProxyResolver::new(
            Arc::new(HttpProber),
            Duration::from_secs(config.probe_timeout_secs),
            Duration::from_secs(config.probe_cache_ttl_secs),
        ));
        resolver.load(config.proxy_configs.clone());

        let runner = Arc::new(SessionRunner::new(sessions.clone(), config.runner.clone()));
        let pool = Arc::new(SessionPool::new(
            config.max_concurrent_sessions,
            sessions.clone(),
            runner,
            stats.clone(),
            Arc::new(HttpDriverFactory),
        ));

        let scheduler = Arc::new(CampaignScheduler::new(
            campaigns.clone(),
            sessions.clone(),
            resolver.clone(),
            pool,
            stats.clone(),
            config.scheduler.clone(),
        ));

        Self {
            config,
            campaigns,
            sessions,
            resolver,
            stats,
            scheduler,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::load())
    }
}

/// Initialize logging (console + daily rolling file)
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "trafficforge.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
