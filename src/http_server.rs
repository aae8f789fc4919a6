// Map Worker HTTP surface (spec.md S4.E, S6 "Map-worker wire protocol"). The
// worker is stateless: every handler borrows shared collaborators from
// `AppState` and carries nothing between requests.

use crate::community::summarize_community;
use crate::contracts::Completion;
use crate::errors::GraphRagError;
use crate::graph::{CommunityData, EdgeData, NodeData, SharedGraphStore};
use crate::observability::get_metrics;
use crate::query::{score_community, SharedRendezvousStore};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

static SERVER_START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Clone)]
pub struct AppState {
    pub store: SharedGraphStore,
    pub rendezvous: SharedRendezvousStore,
    pub completion: Arc<dyn Completion>,
}

impl IntoResponse for GraphRagError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(MessageResponse { message: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct CommunityRequest {
    /// JSON-encoded `CommunityData`, per spec.md S6's "string-encoded-community".
    pub community_record: String,
    pub user_query: String,
}

async fn receive_community_request(
    State(state): State<AppState>,
    Json(req): Json<CommunityRequest>,
) -> Result<Json<MessageResponse>, GraphRagError> {
    let community: CommunityData =
        serde_json::from_str(&req.community_record).map_err(|e| GraphRagError::MalformedRecord(e.to_string()))?;

    let answer = score_community(state.completion.as_ref(), &community, &req.user_query).await?;
    state.rendezvous.put(&req.user_query, community.community_uid.as_str(), answer).await?;

    Ok(Json(MessageResponse { message: "scored".to_string() }))
}

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub community_uid: String,
    /// JSON-encoded `Vec<NodeData>` / `Vec<EdgeData>`.
    pub members: String,
    pub incident_edges: String,
}

async fn receive_summary_request(
    State(state): State<AppState>,
    Json(req): Json<SummaryRequest>,
) -> Result<Json<MessageResponse>, GraphRagError> {
    let community_uid = crate::types::CommunityUid::new(req.community_uid)
        .map_err(|e| GraphRagError::MalformedRecord(e.to_string()))?;
    let members: Vec<NodeData> =
        serde_json::from_str(&req.members).map_err(|e| GraphRagError::MalformedRecord(e.to_string()))?;
    let incident_edges: Vec<EdgeData> =
        serde_json::from_str(&req.incident_edges).map_err(|e| GraphRagError::MalformedRecord(e.to_string()))?;

    let community =
        summarize_community(state.completion.as_ref(), community_uid, &members, &incident_edges).await?;
    state.store.store_community(community).await?;

    Ok(Json(MessageResponse { message: "summarized".to_string() }))
}

async fn helloworld() -> Json<MessageResponse> {
    Json(MessageResponse { message: "Hello World".to_string() })
}

/// Ambient infrastructure health check (SPEC_FULL S4.E), distinct from the
/// GraphRAG-specific `/helloworld` contract (spec.md S6).
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: SERVER_START_TIME.elapsed().as_secs(),
    })
}

async fn metrics() -> Json<serde_json::Value> {
    Json(get_metrics())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/receive_community_request", post(receive_community_request))
        .route("/receive_summary_request", post(receive_summary_request))
        .route("/helloworld", get(helloworld))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
