//! Event-driven facade over the allocation core.
//!
//! [`Engine`] composes the session registry, the allocator and the BESS
//! controller. Every lifecycle event (start, stop, power update) mutates the
//! registry and then synchronously recomputes allocations, so callers always
//! observe post-recompute power values. All methods take `&self` and are safe
//! to call from concurrent request handlers without external locking.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sems_core::{
    Allocator, BessController, SessionError, SessionRegistry, SessionSnapshot, StationConfig,
};

/// Outcome of a session start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartStatus {
    SessionStarted,
    InvalidChargerOrConnector,
    ConnectorOccupied,
    SessionStartFailed,
}

/// Outcome of a power update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    PowerUpdated,
    SessionNotFound,
    InvalidConsumedPower,
}

/// Outcome of a session stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopStatus {
    Ok,
    SessionNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionOutcome {
    pub session_id: Option<String>,
    pub allocated_power: f64,
    pub total_energy: f64,
    pub status: StartStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpdateOutcome {
    pub new_allocated_power: f64,
    pub total_energy: f64,
    pub status: UpdateStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSessionOutcome {
    pub session_id: String,
    pub charger_id: Option<String>,
    pub connector_id: Option<u32>,
    pub final_allocated_power: f64,
    pub last_consumed_power: f64,
    pub stop_time: Option<DateTime<Utc>>,
    pub status: StopStatus,
}

/// BESS block embedded in the station status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryBlock {
    pub soc: f64,
    pub soc_percentage: f64,
    pub capacity: f64,
    pub max_power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatus {
    pub station_id: String,
    pub grid_capacity: f64,
    pub active_sessions: Vec<SessionSnapshot>,
    pub total_allocated_power: f64,
    pub total_consumed_power: f64,
    pub power_allocation: HashMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatteryBlock>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryStatus {
    pub available: bool,
    pub soc: f64,
    pub soc_percentage: f64,
    pub capacity: f64,
    pub max_power: f64,
    /// Positive = discharging, negative = charging, zero = idle.
    pub current_power: f64,
    pub available_discharge: f64,
    pub available_charge: f64,
    pub emergency_state: bool,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub total_sessions: usize,
    pub total_allocated_power: f64,
    pub total_consumed_power: f64,
    pub grid_utilization: f64,
    pub jains_fairness_index: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_soc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_power: Option<f64>,
}

/// Jain's fairness index over a set of allocations: `(Σx)² / (n·Σx²)`.
///
/// Ranges from `1/n` (one session takes everything) to `1.0` (perfectly even
/// split). An empty set or all-zero allocations count as fair.
pub fn jains_fairness_index(allocations: &[f64]) -> f64 {
    if allocations.is_empty() {
        return 1.0;
    }
    let sum: f64 = allocations.iter().sum();
    let sum_squares: f64 = allocations.iter().map(|x| x * x).sum();
    if sum_squares == 0.0 {
        return 1.0;
    }
    (sum * sum) / (allocations.len() as f64 * sum_squares)
}

/// The in-process facade consumed by the HTTP layer.
pub struct Engine {
    config: StationConfig,
    registry: Arc<SessionRegistry>,
    bess: Arc<BessController>,
    allocator: Allocator,
}

impl Engine {
    pub fn new(config: StationConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(&config));
        let bess = Arc::new(BessController::new(config.battery.as_ref()));
        let allocator = Allocator::new(&config, Arc::clone(&registry), Arc::clone(&bess));
        tracing::info!(station_id = %config.station_id, "engine initialized");
        Engine {
            config,
            registry,
            bess,
            allocator,
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// Start a charging session and reallocate power across the station.
    pub fn start_session(
        &self,
        charger_id: &str,
        connector_id: u32,
        vehicle_max_power: f64,
    ) -> StartSessionOutcome {
        match self
            .registry
            .start(charger_id, connector_id, vehicle_max_power)
        {
            Ok(session) => {
                self.allocator.recompute();
                let snapshot = session.snapshot();
                StartSessionOutcome {
                    session_id: Some(snapshot.session_id),
                    allocated_power: snapshot.allocated_power,
                    total_energy: snapshot.total_energy,
                    status: StartStatus::SessionStarted,
                }
            }
            Err(error) => {
                tracing::warn!(charger_id, connector_id, %error, "session start rejected");
                let status = match error {
                    SessionError::UnknownCharger { .. }
                    | SessionError::ConnectorOutOfRange { .. } => {
                        StartStatus::InvalidChargerOrConnector
                    }
                    SessionError::ConnectorAlreadyInUse { .. } => StartStatus::ConnectorOccupied,
                    _ => StartStatus::SessionStartFailed,
                };
                StartSessionOutcome {
                    session_id: None,
                    allocated_power: 0.0,
                    total_energy: 0.0,
                    status,
                }
            }
        }
    }

    /// Record a power report and reallocate.
    ///
    /// A rejected update leaves the session untouched and returns its current
    /// allocation so the charger can resynchronize.
    pub fn update_power(
        &self,
        session_id: &str,
        consumed_power: f64,
        vehicle_max_power: f64,
    ) -> PowerUpdateOutcome {
        match self
            .registry
            .update_power(session_id, consumed_power, vehicle_max_power)
        {
            Ok(session) => {
                self.allocator.recompute();
                let snapshot = session.snapshot();
                PowerUpdateOutcome {
                    new_allocated_power: snapshot.allocated_power,
                    total_energy: snapshot.total_energy,
                    status: UpdateStatus::PowerUpdated,
                }
            }
            Err(SessionError::SessionNotFound { .. }) => PowerUpdateOutcome {
                new_allocated_power: 0.0,
                total_energy: 0.0,
                status: UpdateStatus::SessionNotFound,
            },
            Err(error) => {
                tracing::warn!(session_id, %error, "power update rejected");
                let (allocated, energy) = self
                    .registry
                    .session(session_id)
                    .map(|session| (session.allocated_power(), session.total_energy()))
                    .unwrap_or((0.0, 0.0));
                PowerUpdateOutcome {
                    new_allocated_power: allocated,
                    total_energy: energy,
                    status: UpdateStatus::InvalidConsumedPower,
                }
            }
        }
    }

    /// Stop a session, free its connector and reallocate for the survivors.
    ///
    /// The outcome reports the session's final values as captured at removal,
    /// before the follow-up recompute redistributes its power.
    pub fn stop_session(&self, session_id: &str) -> StopSessionOutcome {
        match self.registry.stop(session_id) {
            Ok(session) => {
                let snapshot = session.snapshot();
                self.allocator.recompute();
                StopSessionOutcome {
                    session_id: session_id.to_string(),
                    charger_id: Some(snapshot.charger_id),
                    connector_id: Some(snapshot.connector_id),
                    final_allocated_power: snapshot.allocated_power,
                    last_consumed_power: snapshot.consumed_power,
                    stop_time: Some(Utc::now()),
                    status: StopStatus::Ok,
                }
            }
            Err(_) => StopSessionOutcome {
                session_id: session_id.to_string(),
                charger_id: None,
                connector_id: None,
                final_allocated_power: 0.0,
                last_consumed_power: 0.0,
                stop_time: None,
                status: StopStatus::SessionNotFound,
            },
        }
    }

    /// Momentary snapshot of one session.
    pub fn session(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.registry.session(session_id).map(|s| s.snapshot())
    }

    /// Momentary snapshot of all sessions, ordered by start time.
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.snapshot()
    }

    pub fn station_status(&self) -> StationStatus {
        let sessions = self.registry.snapshot();
        let total_allocated_power = sessions.iter().map(|s| s.allocated_power).sum();
        let total_consumed_power = sessions.iter().map(|s| s.consumed_power).sum();
        let power_allocation = sessions
            .iter()
            .map(|s| (s.session_id.clone(), s.allocated_power))
            .collect();
        let battery = self.bess.is_available().then(|| BatteryBlock {
            soc: self.bess.soc(),
            soc_percentage: self.bess.soc_percentage(),
            capacity: self.bess.capacity(),
            max_power: self.bess.max_power(),
        });
        StationStatus {
            station_id: self.config.station_id.clone(),
            grid_capacity: self.config.grid_capacity,
            active_sessions: sessions,
            total_allocated_power,
            total_consumed_power,
            power_allocation,
            battery,
            timestamp: Utc::now(),
        }
    }

    pub fn battery_status(&self) -> BatteryStatus {
        BatteryStatus {
            available: self.bess.is_available(),
            soc: self.bess.soc(),
            soc_percentage: self.bess.soc_percentage(),
            capacity: self.bess.capacity(),
            max_power: self.bess.max_power(),
            current_power: self.bess.current_power(),
            available_discharge: self.bess.available_discharge(),
            available_charge: self.bess.available_charge(),
            emergency_state: self.bess.is_emergency_state(),
            last_update: self.bess.last_update(),
        }
    }

    pub fn load_summary(&self) -> LoadSummary {
        let sessions = self.registry.snapshot();
        let allocations: Vec<f64> = sessions.iter().map(|s| s.allocated_power).collect();
        let total_allocated_power: f64 = allocations.iter().sum();
        let grid_utilization = if self.config.grid_capacity > 0.0 {
            total_allocated_power / self.config.grid_capacity
        } else {
            0.0
        };
        let (battery_soc, battery_power) = if self.bess.is_available() {
            (Some(self.bess.soc()), Some(self.bess.current_power()))
        } else {
            (None, None)
        };
        LoadSummary {
            total_sessions: sessions.len(),
            total_allocated_power,
            total_consumed_power: sessions.iter().map(|s| s.consumed_power).sum(),
            grid_utilization,
            jains_fairness_index: jains_fairness_index(&allocations),
            battery_soc,
            battery_power,
        }
    }

    /// Force a recomputation and return the new allocation map.
    pub fn recompute(&self) -> HashMap<String, f64> {
        self.allocator.recompute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sems_core::{BatteryConfig, ChargerConfig, SessionState};

    fn engine(battery: Option<BatteryConfig>) -> Engine {
        Engine::new(StationConfig {
            station_id: "TEST_STATION".to_string(),
            grid_capacity: 400.0,
            chargers: vec![
                ChargerConfig {
                    id: "CP001".to_string(),
                    max_power: 200.0,
                    connectors: 2,
                },
                ChargerConfig {
                    id: "CP002".to_string(),
                    max_power: 200.0,
                    connectors: 2,
                },
            ],
            battery,
        })
    }

    #[test]
    fn test_start_session_returns_post_recompute_allocation() {
        let engine = engine(None);
        let outcome = engine.start_session("CP001", 1, 150.0);

        assert_eq!(outcome.status, StartStatus::SessionStarted);
        assert!(outcome.session_id.is_some());
        assert!((outcome.allocated_power - 150.0).abs() < 0.1);
        assert_eq!(outcome.total_energy, 0.0);
    }

    #[test]
    fn test_start_session_status_mapping() {
        let engine = engine(None);

        let unknown = engine.start_session("CP999", 1, 150.0);
        assert_eq!(unknown.status, StartStatus::InvalidChargerOrConnector);
        assert!(unknown.session_id.is_none());

        let out_of_range = engine.start_session("CP001", 5, 150.0);
        assert_eq!(out_of_range.status, StartStatus::InvalidChargerOrConnector);

        engine.start_session("CP001", 1, 150.0);
        let occupied = engine.start_session("CP001", 1, 100.0);
        assert_eq!(occupied.status, StartStatus::ConnectorOccupied);
    }

    #[test]
    fn test_update_power_flow() {
        let engine = engine(None);
        let started = engine.start_session("CP001", 1, 150.0);
        let session_id = started.session_id.unwrap();

        let updated = engine.update_power(&session_id, 100.0, 150.0);
        assert_eq!(updated.status, UpdateStatus::PowerUpdated);
        assert!(updated.new_allocated_power > 0.0);

        let missing = engine.update_power("no-such-session", 50.0, 100.0);
        assert_eq!(missing.status, UpdateStatus::SessionNotFound);

        // consumed above the vehicle cap: rejected, current allocation echoed
        let invalid = engine.update_power(&session_id, 200.0, 150.0);
        assert_eq!(invalid.status, UpdateStatus::InvalidConsumedPower);
        assert!((invalid.new_allocated_power - updated.new_allocated_power).abs() < 1e-9);
    }

    #[test]
    fn test_stop_session_reports_final_values_and_frees_connector() {
        let engine = engine(None);
        let started = engine.start_session("CP001", 1, 150.0);
        let session_id = started.session_id.unwrap();
        engine.update_power(&session_id, 120.0, 150.0);

        let stopped = engine.stop_session(&session_id);
        assert_eq!(stopped.status, StopStatus::Ok);
        assert_eq!(stopped.charger_id.as_deref(), Some("CP001"));
        assert_eq!(stopped.connector_id, Some(1));
        assert_eq!(stopped.last_consumed_power, 120.0);
        assert!(stopped.stop_time.is_some());

        // The connector is free again and a restart yields a fresh id.
        let restarted = engine.start_session("CP001", 1, 150.0);
        assert_eq!(restarted.status, StartStatus::SessionStarted);
        assert_ne!(restarted.session_id.unwrap(), session_id);

        let again = engine.stop_session(&session_id);
        assert_eq!(again.status, StopStatus::SessionNotFound);
    }

    #[test]
    fn test_session_views() {
        let engine = engine(None);
        let started = engine.start_session("CP001", 1, 150.0);
        let session_id = started.session_id.unwrap();

        let view = engine.session(&session_id).unwrap();
        assert_eq!(view.charger_id, "CP001");
        assert_eq!(view.state, SessionState::Active);
        assert!(engine.session("missing").is_none());

        engine.start_session("CP002", 1, 100.0);
        assert_eq!(engine.sessions().len(), 2);
    }

    #[test]
    fn test_station_status_contents() {
        let engine = engine(Some(BatteryConfig {
            capacity: 200.0,
            power: 100.0,
        }));
        engine.start_session("CP001", 1, 150.0);
        engine.start_session("CP002", 1, 150.0);

        let status = engine.station_status();
        assert_eq!(status.station_id, "TEST_STATION");
        assert_eq!(status.grid_capacity, 400.0);
        assert_eq!(status.active_sessions.len(), 2);
        assert_eq!(status.power_allocation.len(), 2);
        assert!(status.total_allocated_power > 0.0);

        let battery = status.battery.expect("battery block expected");
        assert_eq!(battery.capacity, 200.0);
        assert_eq!(battery.max_power, 100.0);
    }

    #[test]
    fn test_station_status_without_battery() {
        let engine = engine(None);
        let status = engine.station_status();
        assert!(status.battery.is_none());
        assert!(status.active_sessions.is_empty());
    }

    #[test]
    fn test_battery_status_reflects_operations() {
        let engine = engine(Some(BatteryConfig {
            capacity: 200.0,
            power: 100.0,
        }));
        let status = engine.battery_status();
        assert!(status.available);
        assert_eq!(status.soc, 200.0);
        assert_eq!(status.soc_percentage, 100.0);
        assert_eq!(status.available_charge, 0.0);
        assert_eq!(status.available_discharge, 100.0);
        assert!(!status.emergency_state);
    }

    #[test]
    fn test_load_summary_metrics() {
        let engine = engine(None);
        engine.start_session("CP001", 1, 150.0);
        engine.start_session("CP001", 2, 150.0);

        let summary = engine.load_summary();
        assert_eq!(summary.total_sessions, 2);
        // Two even ~100 kW allocations: perfectly fair, half the grid.
        assert!((summary.total_allocated_power - 200.0).abs() < 0.5);
        assert!((summary.grid_utilization - 0.5).abs() < 0.01);
        assert!((summary.jains_fairness_index - 1.0).abs() < 1e-6);
        assert!(summary.battery_soc.is_none());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let engine = engine(None);
        engine.start_session("CP001", 1, 150.0);
        engine.start_session("CP002", 1, 80.0);

        let first = engine.recompute();
        let second = engine.recompute();
        assert_eq!(first.len(), 2);
        for (session_id, allocation) in &first {
            assert!((allocation - second[session_id]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_jains_fairness_index() {
        assert_eq!(jains_fairness_index(&[]), 1.0);
        assert_eq!(jains_fairness_index(&[0.0, 0.0]), 1.0);
        assert_eq!(jains_fairness_index(&[50.0, 50.0]), 1.0);

        // {90, 10}: 100² / (2 · 8200) ≈ 0.6098
        let skewed = jains_fairness_index(&[90.0, 10.0]);
        assert!((skewed - 0.6098).abs() < 0.001);

        // One session taking everything bottoms out at 1/n.
        let n = 4;
        let mut allocations = vec![0.0; n];
        allocations[0] = 100.0;
        assert!((jains_fairness_index(&allocations) - 1.0 / n as f64).abs() < 1e-9);
    }
}
