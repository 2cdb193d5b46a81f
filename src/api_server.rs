// ===================================================================================================
// HTTP surface — terminates the wire messages as axum routes
// ===================================================================================================
//
// Every route requires `Authorization: Bearer <token>` when the node is configured with one;
// the check runs once, in middleware, ahead of any handler. Handlers themselves stay thin:
// deserialize, call into `MeshManager`/`WorkDistributor`, serialize the result.
// ===================================================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use axum::extract::Request;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::distributor::WorkDistributor;
use crate::identity::NodeIdentity;
use crate::mesh::MeshManager;
use crate::messages::{
    GossipMessage, HeartbeatMessage, JoinRequest, LeaveRequest, OkResponse, SwarmTaskRequest,
    SwarmTaskResult, TaskRequestDecision,
};

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        let body = Json(serde_json::json!({ "error": message, "status": status.as_u16() }));
        (status, body).into_response()
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub mesh: Arc<MeshManager>,
    pub distributor: Arc<WorkDistributor>,
    pub token: Option<String>,
}

/// Rejects the request before any route handler runs unless the configured bearer
/// token (if any) matches. A node with no configured token accepts every request.
async fn require_bearer_token(
    State(state): State<ApiState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = &state.token else {
        return Ok(next.run(request).await);
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized("missing or invalid bearer token".to_string())),
    }
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/identity", get(get_identity))
        .route("/join", post(post_join))
        .route("/leave", post(post_leave))
        .route("/heartbeat", post(post_heartbeat))
        .route("/gossip", post(post_gossip))
        .route("/task/request", post(post_task_request))
        .route("/task/result", post(post_task_result))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_identity(State(state): State<ApiState>) -> Json<NodeIdentity> {
    Json(state.mesh.local_identity().clone())
}

async fn post_join(
    State(state): State<ApiState>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .mesh
        .handle_join(req.identity)
        .await
        .map(|_| Json(OkResponse::ok()))
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn post_leave(
    State(state): State<ApiState>,
    Json(req): Json<LeaveRequest>,
) -> Json<OkResponse> {
    state.mesh.handle_leave(&req.node_id).await;
    Json(OkResponse::ok())
}

async fn post_heartbeat(
    State(state): State<ApiState>,
    Json(msg): Json<HeartbeatMessage>,
) -> Json<OkResponse> {
    let accepted = state.mesh.handle_heartbeat(msg, 0).await;
    if !accepted {
        warn!("heartbeat from unknown peer");
    }
    Json(OkResponse::ok())
}

async fn post_gossip(
    State(state): State<ApiState>,
    Json(msg): Json<GossipMessage>,
) -> Json<GossipMessage> {
    Json(state.mesh.handle_gossip(msg).await)
}

async fn post_task_request(
    State(state): State<ApiState>,
    Json(req): Json<SwarmTaskRequest>,
) -> Json<TaskRequestDecision> {
    Json(state.mesh.handle_task_request(req).await)
}

async fn post_task_result(
    State(state): State<ApiState>,
    Json(result): Json<SwarmTaskResult>,
) -> Result<Json<OkResponse>, ApiError> {
    let task_id = result.task_id.clone();
    let resolved = state.mesh.handle_task_result(result).await;
    if !resolved {
        return Err(ApiError::NotFound(format!("no pending delegation for task {task_id}")));
    }
    Ok(Json(OkResponse::ok()))
}

/// Bind and serve until the process is asked to stop. Returns once the listener closes.
pub async fn serve(addr: &str, router: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "swarm node listening");
    axum::serve(listener, router).await
}
