use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use sems_core::StationConfig;
use sems_engine::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeResponse {
    pub success: bool,
    pub allocations_computed: usize,
    pub total_allocated_power: f64,
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub station_id: String,
    pub active_sessions: usize,
    pub grid_capacity: f64,
    pub battery_available: bool,
}

/// Get the station configuration.
pub async fn get_station_config(State(engine): State<Arc<Engine>>) -> Json<StationConfig> {
    Json(engine.config().clone())
}

/// Get the full station status: sessions, totals, allocation map, BESS.
pub async fn get_station_status(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    tracing::debug!("station status requested");
    Json(engine.station_status())
}

/// Get the detailed battery status.
pub async fn get_battery_status(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(engine.battery_status())
}

/// Get load management metrics: totals, utilization, fairness index.
pub async fn get_load_summary(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(engine.load_summary())
}

/// Force an immediate reallocation.
pub async fn trigger_recompute(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    tracing::info!("manual recomputation triggered");
    let allocations = engine.recompute();
    Json(RecomputeResponse {
        success: true,
        allocations_computed: allocations.len(),
        total_allocated_power: allocations.values().sum(),
        timestamp: Utc::now(),
    })
}

/// Health check for monitoring.
pub async fn health_check(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let status = engine.station_status();
    Json(HealthResponse {
        status: "UP".to_string(),
        station_id: status.station_id,
        active_sessions: status.active_sessions.len(),
        grid_capacity: status.grid_capacity,
        battery_available: engine.battery_status().available,
    })
}
