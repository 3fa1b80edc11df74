use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::warn;

use crate::domain::dispatch::ActionRequest;
use crate::domain::fleet_service::FleetService;
use crate::domain::types::*;
use crate::remote::RemoteChannel;

/// Shared application state for all API handlers.
pub struct AppState<C> {
    pub fleet: Arc<FleetService<C>>,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            fleet: self.fleet.clone(),
        }
    }
}

pub fn router<C: RemoteChannel>(state: AppState<C>) -> Router {
    Router::new()
        .route("/health", get(health::<C>))
        // Legacy dashboard paths
        .route("/status", get(fleet_status_by_host::<C>))
        .route("/execute", post(execute::<C>))
        .route("/logs/{host}", get(logs::<C>))
        // Versioned API
        .route("/api/v1/fleet", get(fleet_status::<C>))
        .route("/api/v1/actions", post(execute::<C>))
        .route("/api/v1/hosts/{host}/logs", get(logs::<C>))
        .route("/api/v1/hosts/{host}/check", post(check_host::<C>))
        .with_state(state)
}

async fn health<C: RemoteChannel>(State(state): State<AppState<C>>) -> Json<DaemonHealth> {
    Json(state.fleet.health().await)
}

/// Serve the cached fleet view. Never triggers remote calls.
async fn fleet_status<C: RemoteChannel>(State(state): State<AppState<C>>) -> Json<FleetStatus> {
    Json(state.fleet.fleet_status().await)
}

/// Same cache read, keyed by host as the dashboard expects.
async fn fleet_status_by_host<C: RemoteChannel>(
    State(state): State<AppState<C>>,
) -> Json<FleetStatusByHost> {
    Json(FleetStatusByHost(state.fleet.fleet_status().await))
}

/// Failures are reported in the body (`success: false`), not as HTTP errors.
/// A body that cannot be decoded gets the same response shape with a 400.
async fn execute<C: RemoteChannel>(
    State(state): State<AppState<C>>,
    request: Result<Json<ActionRequest>, JsonRejection>,
) -> (StatusCode, Json<ActionResponse>) {
    match request {
        Ok(Json(request)) => (StatusCode::OK, Json(state.fleet.perform_action(&request).await)),
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected malformed action request");
            (
                StatusCode::BAD_REQUEST,
                Json(ActionResponse::failure(format!(
                    "invalid request: {}",
                    rejection.body_text()
                ))),
            )
        }
    }
}

async fn logs<C: RemoteChannel>(
    State(state): State<AppState<C>>,
    Path(host): Path<String>,
) -> (StatusCode, Json<LogsResponse>) {
    let status = if state.fleet.is_known_host(&host) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(state.fleet.logs(&host).await))
}

/// Run a status check for one host now and return the fresh entry.
async fn check_host<C: RemoteChannel>(
    State(state): State<AppState<C>>,
    Path(host): Path<String>,
) -> Result<Json<HostStatus>, (StatusCode, String)> {
    state
        .fleet
        .check_host(&host)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}
