//! HTTP route handlers for the orchestration engine.
//!
//! Thin request/response plumbing: validate input, forward to the engine,
//! map `EngineError` onto status codes. The session-tracking endpoint is
//! the only channel by which the outside world advances a session past
//! `target_reached`.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;

use crate::campaign::{Campaign, NewCampaign};
use crate::error::EngineError;
use crate::session::{SessionEvent, SessionUpdate, StageTransition};
use crate::AppState;

/// JSON error response helper
fn err_response(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "error": msg })))
}

/// Map engine errors onto status codes with a structured body
fn engine_err(err: EngineError) -> axum::response::Response {
    let status = match err {
        EngineError::Client(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ResourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    err_response(status, &err.to_string()).into_response()
}

/// Build the API router with all endpoints.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Campaigns
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/:id", get(get_campaign))
        .route("/campaigns/start", post(start_campaign))
        .route("/campaigns/pause", post(pause_campaign))
        // Session tracking (reporting agent -> engine)
        .route("/sessions/track", post(track_session))
        .route("/sessions", get(list_sessions))
        // Scheduler
        .route("/scheduler/tick", post(run_tick))
        // Stats & status
        .route("/stats", get(get_stats))
        .route("/status", get(get_status))
        // Proxy
        .route("/proxy/test", post(test_proxy))
        // Auth middleware (only if TRAFFICFORGE_WEB_PASS is set)
        .layer(middleware::from_fn(super::auth::basic_auth_middleware))
        .layer(Extension(state))
}

// ========== Campaign Handlers ==========

async fn create_campaign(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<NewCampaign>,
) -> impl IntoResponse {
    if req.target_url.is_empty() || req.search_keyword.is_empty() {
        return engine_err(EngineError::Client(
            "targetUrl and searchKeyword are required".into(),
        ));
    }
    if req.total_sessions == 0 {
        return engine_err(EngineError::Client("totalSessions must be positive".into()));
    }

    let campaign = Campaign::from_request(req);
    info!("Campaign {} created ('{}')", campaign.id, campaign.name);
    state.campaigns.insert(campaign.clone());
    (StatusCode::CREATED, Json(campaign)).into_response()
}

async fn list_campaigns(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.campaigns.list())
}

async fn get_campaign(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.campaigns.get(&id) {
        Some(campaign) => {
            let counts = state.sessions.counts_for_campaign(&id);
            Json(serde_json::json!({ "campaign": campaign, "sessions": counts })).into_response()
        }
        None => engine_err(EngineError::NotFound(format!("campaign {}", id))),
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CampaignIdRequest {
    campaign_id: Option<Uuid>,
}

async fn start_campaign(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<CampaignIdRequest>,
) -> impl IntoResponse {
    let campaign_id = match req.campaign_id {
        Some(id) => id,
        None => return engine_err(EngineError::Client("campaignId is required".into())),
    };

    info!("Starting campaign {} via web API", campaign_id);

    match state.scheduler.activate_campaign(&campaign_id).await {
        Ok((campaign, summary)) => Json(serde_json::json!({
            "success": true,
            "campaignId": campaign.id,
            "status": campaign.status,
            "schedulerResult": summary,
        }))
        .into_response(),
        Err(e) => engine_err(e),
    }
}

async fn pause_campaign(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<CampaignIdRequest>,
) -> impl IntoResponse {
    let campaign_id = match req.campaign_id {
        Some(id) => id,
        None => return engine_err(EngineError::Client("campaignId is required".into())),
    };

    info!("Pausing campaign {} via web API", campaign_id);

    match state.campaigns.pause(&campaign_id) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => engine_err(e),
    }
}

// ========== Session Tracking Handlers ==========

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackSessionRequest {
    session_id: Option<Uuid>,
    event: Option<String>,
    update: Option<SessionUpdate>,
    extension_id: Option<String>,
}

async fn track_session(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<TrackSessionRequest>,
) -> impl IntoResponse {
    let session_id = match req.session_id {
        Some(id) => id,
        None => return engine_err(EngineError::Client("sessionId is required".into())),
    };

    if let Some(update) = req.update {
        return match state.sessions.apply_update(&session_id, update) {
            Ok(()) => Json(serde_json::json!({ "success": true, "sessionId": session_id }))
                .into_response(),
            Err(e) => engine_err(e),
        };
    }

    let event_name = match req.event {
        Some(name) => name,
        None => {
            return engine_err(EngineError::Client(
                "Either event or update is required".into(),
            ))
        }
    };

    let event = match SessionEvent::from_str(&event_name) {
        Ok(event) => event,
        Err(e) => return engine_err(e),
    };

    match state.sessions.apply_event(&session_id, event, req.extension_id) {
        Ok(transition) => {
            // Duplicate delivery is accepted as a no-op; only a forward
            // skip is a client error
            if transition == StageTransition::Rejected {
                return engine_err(EngineError::Client(format!(
                    "event {} is out of order for session {}",
                    event_name, session_id
                )));
            }
            Json(serde_json::json!({
                "success": true,
                "event": event_name,
                "sessionId": session_id,
            }))
            .into_response()
        }
        Err(e) => engine_err(e),
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsQuery {
    campaign_id: Option<Uuid>,
}

async fn list_sessions(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ListSessionsQuery>,
) -> impl IntoResponse {
    match query.campaign_id {
        Some(campaign_id) => Json(state.sessions.list_for_campaign(&campaign_id)).into_response(),
        None => engine_err(EngineError::Client("campaignId is required".into())),
    }
}

// ========== Scheduler Handlers ==========

async fn run_tick(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    info!("Manual scheduler tick via web API");
    Json(state.scheduler.tick().await)
}

// ========== Stats & Status Handlers ==========

async fn get_stats(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

async fn get_status(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let active = state
        .campaigns
        .list()
        .iter()
        .filter(|c| c.status.is_active())
        .count();
    let snapshot = state.stats.snapshot();

    Json(serde_json::json!({
        "activeCampaigns": active,
        "sessionsInFlight": snapshot.in_flight,
        "ticks": snapshot.ticks,
    }))
}

// ========== Proxy Handlers ==========

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyTestRequest {
    owner_id: Uuid,
}

async fn test_proxy(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<ProxyTestRequest>,
) -> impl IntoResponse {
    info!("Testing proxy resolution for owner {}", req.owner_id);

    match state.resolver.resolve(&req.owner_id).await {
        Ok(handle) => Json(serde_json::json!({
            "available": true,
            "endpoint": handle.endpoint_url(),
        }))
        .into_response(),
        Err(e) => Json(serde_json::json!({
            "available": false,
            "error": e.to_string(),
        }))
        .into_response(),
    }
}
