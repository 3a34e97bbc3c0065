//! trafficforge - Standalone Web Server
//!
//! Runs the orchestration engine with its HTTP API and a periodic
//! scheduler tick.
//!
//! Environment variables:
//! - `TRAFFICFORGE_WEB_PORT` - Server port (default: 8080)
//! - `TRAFFICFORGE_WEB_USER` - Basic auth username (default: "admin")
//! - `TRAFFICFORGE_WEB_PASS` - Basic auth password (auth disabled if not set)

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = trafficforge::init_logging();

    info!("Starting trafficforge (server mode)");

    if let Some(dir) = trafficforge::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let port: u16 = std::env::var("TRAFFICFORGE_WEB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    if std::env::var("TRAFFICFORGE_WEB_PASS").map(|p| !p.is_empty()).unwrap_or(false) {
        let user = std::env::var("TRAFFICFORGE_WEB_USER").unwrap_or_else(|_| "admin".to_string());
        info!("Basic auth enabled (user: {})", user);
    } else {
        info!("Basic auth disabled (set TRAFFICFORGE_WEB_PASS to enable)");
    }

    let config = trafficforge::AppConfig::load();

    if config.proxy_configs.is_empty() {
        warn!("No proxy configurations loaded - campaigns cannot dispatch sessions");
    }

    let tick_interval = config.tick_interval_secs;
    let state = Arc::new(trafficforge::AppState::new(config));

    info!("Application state initialized");

    // Periodic scheduler tick; activation also triggers an immediate one
    let job_scheduler = JobScheduler::new().await?;
    let tick_state = state.clone();

    job_scheduler
        .add(Job::new_repeated_async(
            Duration::from_secs(tick_interval),
            move |_id, _scheduler| {
                let state = tick_state.clone();
                Box::pin(async move {
                    let summary = state.scheduler.tick().await;
                    if summary.sessions_dispatched > 0 {
                        info!(
                            "Periodic tick dispatched {} sessions across {} campaigns",
                            summary.sessions_dispatched, summary.campaigns_examined
                        );
                    }
                })
            },
        )?)
        .await?;

    job_scheduler.start().await?;
    info!("Scheduler tick every {}s", tick_interval);

    // Start the web server (blocks until shutdown)
    trafficforge::web::start_server(state, port).await?;

    Ok(())
}
