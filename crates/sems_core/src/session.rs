use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ConnectorKey;

/// Lifecycle state of a charging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Starting,
    Active,
    Stopping,
    Completed,
}

#[derive(Debug)]
struct SessionData {
    vehicle_max_power: f64,
    allocated_power: f64,
    consumed_power: f64,
    total_energy: f64,
    state: SessionState,
    last_update: DateTime<Utc>,
}

/// One active charging engagement of a vehicle on a specific connector.
///
/// Identity (`session_id`, charger, connector, start time) is immutable; the
/// power and energy fields live behind a per-session lock so that each update
/// is a single atomic transition. The registry hands sessions out as
/// `Arc<Session>`, so updates are linearizable per session without any
/// registry-wide lock.
#[derive(Debug)]
pub struct Session {
    session_id: String,
    charger_id: String,
    connector_id: u32,
    start_time: DateTime<Utc>,
    data: Mutex<SessionData>,
}

impl Session {
    pub fn new(
        session_id: String,
        charger_id: String,
        connector_id: u32,
        vehicle_max_power: f64,
    ) -> Self {
        let now = Utc::now();
        Session {
            session_id,
            charger_id,
            connector_id,
            start_time: now,
            data: Mutex::new(SessionData {
                vehicle_max_power: vehicle_max_power.max(0.0),
                allocated_power: 0.0,
                consumed_power: 0.0,
                total_energy: 0.0,
                state: SessionState::Active,
                last_update: now,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn charger_id(&self) -> &str {
        &self.charger_id
    }

    pub fn connector_id(&self) -> u32 {
        self.connector_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn connector_key(&self) -> ConnectorKey {
        ConnectorKey {
            charger_id: self.charger_id.clone(),
            connector_id: self.connector_id,
        }
    }

    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a power report from the charger.
    ///
    /// Integrates `consumed · Δh` into the accumulated energy, where Δh is
    /// measured against this session's own last-update timestamp, then
    /// overwrites the instantaneous consumption and the vehicle capability.
    pub fn update_power(&self, consumed_power: f64, vehicle_max_power: f64) {
        let mut data = self.data();
        let now = Utc::now();
        let hours_elapsed =
            (now - data.last_update).num_milliseconds().max(0) as f64 / 3_600_000.0;
        data.total_energy += consumed_power.max(0.0) * hours_elapsed;
        data.consumed_power = consumed_power.max(0.0);
        data.vehicle_max_power = vehicle_max_power.max(0.0);
        data.last_update = now;
    }

    /// Write back the allocator's decision. Negative values clamp to zero.
    pub fn set_allocated_power(&self, power: f64) {
        let mut data = self.data();
        data.allocated_power = power.max(0.0);
        data.last_update = Utc::now();
    }

    pub fn set_state(&self, state: SessionState) {
        let mut data = self.data();
        data.state = state;
        data.last_update = Utc::now();
    }

    pub fn vehicle_max_power(&self) -> f64 {
        self.data().vehicle_max_power
    }

    pub fn allocated_power(&self) -> f64 {
        self.data().allocated_power
    }

    pub fn consumed_power(&self) -> f64 {
        self.data().consumed_power
    }

    pub fn total_energy(&self) -> f64 {
        self.data().total_energy
    }

    pub fn state(&self) -> SessionState {
        self.data().state
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.data().last_update
    }

    /// Capture all fields at one moment. Later mutations do not affect the
    /// returned value.
    pub fn snapshot(&self) -> SessionSnapshot {
        let data = self.data();
        SessionSnapshot {
            session_id: self.session_id.clone(),
            charger_id: self.charger_id.clone(),
            connector_id: self.connector_id,
            vehicle_max_power: data.vehicle_max_power,
            allocated_power: data.allocated_power,
            consumed_power: data.consumed_power,
            total_energy: data.total_energy,
            state: data.state,
            start_time: self.start_time,
            last_update: data.last_update,
        }
    }
}

/// Plain-value capture of a session, used by the allocator and the read API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub charger_id: String,
    pub connector_id: u32,
    pub vehicle_max_power: f64,
    pub allocated_power: f64,
    pub consumed_power: f64,
    pub total_energy: f64,
    pub state: SessionState,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("s-1".to_string(), "CP001".to_string(), 1, 150.0)
    }

    #[test]
    fn test_new_session_is_active_with_zeroed_counters() {
        let session = session();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.allocated_power(), 0.0);
        assert_eq!(session.consumed_power(), 0.0);
        assert_eq!(session.total_energy(), 0.0);
        assert_eq!(session.vehicle_max_power(), 150.0);
    }

    #[test]
    fn test_set_allocated_power_clamps_negatives() {
        let session = session();
        session.set_allocated_power(-10.0);
        assert_eq!(session.allocated_power(), 0.0);
        session.set_allocated_power(42.5);
        assert_eq!(session.allocated_power(), 42.5);
    }

    #[test]
    fn test_total_energy_is_monotonic() {
        let session = session();
        std::thread::sleep(std::time::Duration::from_millis(15));
        session.update_power(100.0, 150.0);
        let after_first = session.total_energy();
        assert!(after_first > 0.0, "energy should accumulate over time");

        std::thread::sleep(std::time::Duration::from_millis(15));
        session.update_power(50.0, 150.0);
        assert!(session.total_energy() >= after_first);

        // A zero-consumption report must not reduce accumulated energy.
        session.update_power(0.0, 150.0);
        assert!(session.total_energy() >= after_first);
    }

    #[test]
    fn test_update_power_bumps_last_update() {
        let session = session();
        let before = session.last_update();
        std::thread::sleep(std::time::Duration::from_millis(5));
        session.update_power(10.0, 150.0);
        assert!(session.last_update() > before);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_mutations() {
        let session = session();
        let snapshot = session.snapshot();
        session.set_allocated_power(99.0);
        assert_eq!(snapshot.allocated_power, 0.0);
        assert_eq!(session.allocated_power(), 99.0);
    }

    #[test]
    fn test_connector_key() {
        let session = session();
        let key = session.connector_key();
        assert_eq!(key.charger_id, "CP001");
        assert_eq!(key.connector_id, 1);
        assert_eq!(key.to_string(), "CP001:1");
    }
}
