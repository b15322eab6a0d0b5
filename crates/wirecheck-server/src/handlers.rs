//! REST API handlers for the Wirecheck server

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wirecheck_core::{EntryPointInfo, FunctionId, ModuleReport, ReachabilityStatus, RepoId, StoreError};
use wirecheck_pipeline::{ChangeAction, ChangeEvent};

use crate::ServerState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pending_units: usize,
}

/// Acknowledgement of a scheduled change event
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub repo: RepoId,
    pub stream: String,
    pub revision: String,
}

#[derive(Debug, Deserialize)]
pub struct UnreachableQuery {
    pub module: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReachabilityRequest {
    pub functions: Vec<FunctionId>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionReachability {
    pub function: FunctionId,
    pub status: ReachabilityStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Store failures mapped onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::NotMapped(_) => StatusCode::NOT_FOUND,
            e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status != StatusCode::NOT_FOUND {
            warn!("Graph query failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_units: state.scheduler.pending_units(),
    })
}

/// Accept a change notification and hand it to the scheduler. Pushes
/// anywhere but the default branch would overwrite its graph and are refused.
pub async fn receive_event(State(state): State<Arc<ServerState>>, Json(event): Json<ChangeEvent>) -> Response {
    if event.action == ChangeAction::Pushed && event.branch_name() != state.default_branch {
        warn!(
            "Refusing push to {} of {}, only {} is mapped",
            event.head_ref, event.repo, state.default_branch
        );
        let body = ErrorResponse {
            error: format!(
                "push to {} rejected: only the default branch {} is mapped",
                event.head_ref, state.default_branch
            ),
        };
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
    }
    info!(
        "Received {:?} for {} {} at {}",
        event.action,
        event.repo,
        event.stream(),
        event.revision
    );
    let accepted = AcceptedResponse {
        repo: event.repo.clone(),
        stream: event.stream().to_string(),
        revision: event.revision.clone(),
    };
    state.scheduler.submit(event);
    (StatusCode::ACCEPTED, Json(accepted)).into_response()
}

pub async fn get_entry_points(
    State(state): State<Arc<ServerState>>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Json<Vec<EntryPointInfo>>, ApiError> {
    let repo = RepoId::from_parts(&owner, &name);
    Ok(Json(state.store.query_entry_points(&repo).await?))
}

pub async fn get_unreachable(
    State(state): State<Arc<ServerState>>,
    Path((owner, name)): Path<(String, String)>,
    Query(query): Query<UnreachableQuery>,
) -> Result<Json<Vec<ModuleReport>>, ApiError> {
    let repo = RepoId::from_parts(&owner, &name);
    let reports = state
        .store
        .query_all_unreachable(&repo, query.module.as_deref(), &state.engine)
        .await?;
    Ok(Json(reports))
}

pub async fn post_reachability(
    State(state): State<Arc<ServerState>>,
    Path((owner, name)): Path<(String, String)>,
    Json(request): Json<ReachabilityRequest>,
) -> Result<Json<Vec<FunctionReachability>>, ApiError> {
    let repo = RepoId::from_parts(&owner, &name);
    let statuses = state
        .store
        .query_reachability(&repo, &request.functions, &state.engine)
        .await?;
    let results = request
        .functions
        .iter()
        .filter_map(|id| {
            statuses.get(id).map(|status| FunctionReachability {
                function: *id,
                status: *status,
            })
        })
        .collect();
    Ok(Json(results))
}
