/**
 * API HTTP SENSORHUB - Frontière mince au-dessus de l'orchestrateur
 *
 * ROUTES :
 * - GET  /health             → "ok"
 * - GET  /system/health      → uptime, viewers, état broker, reconnexions
 * - GET  /connection-status  → { deviceAlive, brokerUp, lastDataAt }
 * - GET  /devices/status     → dernier état connu de chaque canal (+ libellé)
 * - POST /control            → { channel, action } → CommandIntent
 * - GET  /ws                 → WebSocket viewer (événements poussés)
 *
 * Les requêtes historiques (pagination, filtres) ne passent pas par ici.
 */

use crate::liveness::HealthState;
use crate::models::{ChannelView, CommandIntent, CommandOutcome, ConnectionStatus};
use crate::orchestrator::Orchestrator;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<Orchestrator>,
    pub viewer_queue: usize,
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub channel: String,
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub viewers: usize,
    pub broker_status: HealthState,
    pub broker_reconnects: u32,
    pub device_status: HealthState,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/connection-status", get(get_connection_status))
        .route("/devices/status", get(get_devices_status))
        .route("/control", post(post_control))
        .route("/ws", get(ws_upgrade))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    let liveness = app.kernel.liveness();
    Json(KernelHealth {
        uptime_seconds: app.kernel.uptime().as_secs(),
        viewers: app.kernel.hub().viewer_count(),
        broker_status: liveness.broker_state(),
        broker_reconnects: liveness.broker_reconnects(),
        device_status: liveness.device_state(),
    })
}

// GET /connection-status
async fn get_connection_status(State(app): State<AppState>) -> Json<ConnectionStatus> {
    Json(app.kernel.connection_status())
}

// GET /devices/status
async fn get_devices_status(State(app): State<AppState>) -> Json<Vec<ChannelView>> {
    Json(app.kernel.status_snapshot())
}

// POST /control
async fn post_control(
    State(app): State<AppState>,
    Json(req): Json<ControlRequest>,
) -> (StatusCode, Json<CommandIntent>) {
    let intent = app.kernel.handle_control_request(&req.channel, &req.action).await;
    (status_for(intent.outcome), Json(intent))
}

fn status_for(outcome: CommandOutcome) -> StatusCode {
    match outcome {
        CommandOutcome::Sent => StatusCode::OK,
        CommandOutcome::RejectedDeviceOffline => StatusCode::CONFLICT,
        CommandOutcome::RejectedInvalid => StatusCode::BAD_REQUEST,
        CommandOutcome::PublishFailed => StatusCode::BAD_GATEWAY,
    }
}

// GET /ws
async fn ws_upgrade(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    let hub = app.kernel.hub().clone();
    ws.on_upgrade(move |socket| crate::ws::handle_viewer(socket, hub, app.viewer_queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_status_codes() {
        assert_eq!(status_for(CommandOutcome::Sent), StatusCode::OK);
        assert_eq!(status_for(CommandOutcome::RejectedDeviceOffline), StatusCode::CONFLICT);
        assert_eq!(status_for(CommandOutcome::RejectedInvalid), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(CommandOutcome::PublishFailed), StatusCode::BAD_GATEWAY);
    }
}
