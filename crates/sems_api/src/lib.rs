//! HTTP surface of the station energy management system.
//!
//! Maps the engine facade onto a REST API:
//!
//! - `POST /api/v1/sessions` plus per-session `power-update`, `stop` and
//!   read endpoints for the charging session lifecycle. Engine statuses
//!   translate to HTTP codes (created / bad request / conflict / not found).
//! - `GET /api/v1/station/{status,config,battery,load-summary}` and
//!   `POST /api/v1/station/recompute` for station-wide views and a forced
//!   reallocation.
//! - `GET /health` for monitoring.
//!
//! Handlers share one [`Engine`](sems_engine::Engine) behind an `Arc`; the
//! core is internally synchronized, so no request-level locking happens here.

mod session;
mod station;

use axum::{
    Router,
    routing::{get, post},
};
use sems_engine::Engine;
use std::sync::Arc;

/// Create the application router with all endpoints.
pub fn create_app(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(station::health_check))
        .route(
            "/api/v1/sessions",
            post(session::create_session).get(session::list_sessions),
        )
        .route("/api/v1/sessions/{session_id}", get(session::get_session))
        .route(
            "/api/v1/sessions/{session_id}/power-update",
            post(session::power_update),
        )
        .route(
            "/api/v1/sessions/{session_id}/stop",
            post(session::stop_session),
        )
        .route("/api/v1/station/status", get(station::get_station_status))
        .route("/api/v1/station/config", get(station::get_station_config))
        .route("/api/v1/station/battery", get(station::get_battery_status))
        .route(
            "/api/v1/station/load-summary",
            get(station::get_load_summary),
        )
        .route(
            "/api/v1/station/recompute",
            post(station::trigger_recompute),
        )
        .with_state(engine)
}
