use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sems_engine::{Engine, StartStatus, StopStatus, UpdateStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub charger_id: String,
    pub connector_id: u32,
    pub vehicle_max_power: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpdateRequest {
    pub consumed_power: f64,
    pub vehicle_max_power: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub sessions: Vec<sems_core::SessionSnapshot>,
    pub total_sessions: usize,
    pub total_allocated_power: f64,
    pub total_consumed_power: f64,
    pub total_energy: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

/// Start a new charging session.
///
/// Mirrors the OCPP StartTransaction flow: the response carries the
/// allocation computed by the reallocation that the start triggered.
pub async fn create_session(
    State(engine): State<Arc<Engine>>,
    Json(payload): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let outcome = engine.start_session(
        &payload.charger_id,
        payload.connector_id,
        payload.vehicle_max_power,
    );
    let status = match outcome.status {
        StartStatus::SessionStarted => StatusCode::CREATED,
        StartStatus::InvalidChargerOrConnector => StatusCode::BAD_REQUEST,
        StartStatus::ConnectorOccupied => StatusCode::CONFLICT,
        StartStatus::SessionStartFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(outcome))
}

/// Report consumed power and an updated vehicle capability for a session.
pub async fn power_update(
    State(engine): State<Arc<Engine>>,
    Path(session_id): Path<String>,
    Json(payload): Json<PowerUpdateRequest>,
) -> impl IntoResponse {
    let outcome = engine.update_power(
        &session_id,
        payload.consumed_power,
        payload.vehicle_max_power,
    );
    let status = match outcome.status {
        UpdateStatus::PowerUpdated => StatusCode::OK,
        UpdateStatus::SessionNotFound => StatusCode::NOT_FOUND,
        UpdateStatus::InvalidConsumedPower => StatusCode::BAD_REQUEST,
    };
    (status, Json(outcome))
}

/// Stop an existing charging session and reallocate for the remainder.
pub async fn stop_session(
    State(engine): State<Arc<Engine>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let outcome = engine.stop_session(&session_id);
    let status = match outcome.status {
        StopStatus::Ok => StatusCode::OK,
        StopStatus::SessionNotFound => StatusCode::NOT_FOUND,
    };
    (status, Json(outcome))
}

/// Get a momentary snapshot of one session.
pub async fn get_session(
    State(engine): State<Arc<Engine>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match engine.session(&session_id) {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// List all active sessions with station-wide totals.
pub async fn list_sessions(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let sessions = engine.sessions();
    let response = SessionListResponse {
        total_sessions: sessions.len(),
        total_allocated_power: sessions.iter().map(|s| s.allocated_power).sum(),
        total_consumed_power: sessions.iter().map(|s| s.consumed_power).sum(),
        total_energy: sessions.iter().map(|s| s.total_energy).sum(),
        sessions,
    };
    Json(response)
}
