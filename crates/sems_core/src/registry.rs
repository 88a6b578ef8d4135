use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::error::SessionError;
use crate::models::{ChargerConfig, ConnectorKey, StationConfig};
use crate::session::{Session, SessionSnapshot, SessionState};

/// Thread-safe owner of session identity and connector exclusivity.
///
/// Two indexes are kept: session id → session, and connector → session id.
/// `start` publishes into both or neither; the connector index is the source
/// of truth for exclusivity, so a start that loses the race for a connector
/// rolls its session insert back. No operation holds a lock across a call
/// into another component.
pub struct SessionRegistry {
    chargers: HashMap<String, ChargerConfig>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    connectors: RwLock<HashMap<ConnectorKey, String>>,
}

impl SessionRegistry {
    pub fn new(config: &StationConfig) -> Self {
        let chargers = config
            .chargers
            .iter()
            .map(|charger| (charger.id.clone(), charger.clone()))
            .collect();
        SessionRegistry {
            chargers,
            sessions: RwLock::new(HashMap::new()),
            connectors: RwLock::new(HashMap::new()),
        }
    }

    fn sessions_read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn sessions_write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    fn connectors_read(&self) -> RwLockReadGuard<'_, HashMap<ConnectorKey, String>> {
        self.connectors.read().unwrap_or_else(|e| e.into_inner())
    }

    fn connectors_write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectorKey, String>> {
        self.connectors.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a new charging session on the given connector.
    ///
    /// Validates the charger id and connector range against the station
    /// configuration, then claims the connector. Under a concurrent start on
    /// the same connector exactly one caller wins; the loser observes
    /// `ConnectorAlreadyInUse` and leaves no trace in either index.
    pub fn start(
        &self,
        charger_id: &str,
        connector_id: u32,
        vehicle_max_power: f64,
    ) -> Result<Arc<Session>, SessionError> {
        let charger =
            self.chargers
                .get(charger_id)
                .ok_or_else(|| SessionError::UnknownCharger {
                    charger_id: charger_id.to_string(),
                })?;
        if connector_id < 1 || connector_id > charger.connectors {
            return Err(SessionError::ConnectorOutOfRange {
                charger_id: charger_id.to_string(),
                connector_id,
            });
        }

        let key = ConnectorKey {
            charger_id: charger_id.to_string(),
            connector_id,
        };
        if self.connectors_read().contains_key(&key) {
            return Err(SessionError::ConnectorAlreadyInUse {
                charger_id: charger_id.to_string(),
                connector_id,
            });
        }

        let session = Arc::new(Session::new(
            Uuid::new_v4().to_string(),
            charger_id.to_string(),
            connector_id,
            vehicle_max_power,
        ));
        let session_id = session.session_id().to_string();

        {
            let mut sessions = self.sessions_write();
            if sessions.contains_key(&session_id) {
                tracing::error!(%session_id, "session id collision");
                return Err(SessionError::SessionIdCollision { session_id });
            }
            sessions.insert(session_id.clone(), Arc::clone(&session));
        }

        {
            let mut connectors = self.connectors_write();
            if connectors.contains_key(&key) {
                // Lost the race for the connector: roll the session insert back.
                drop(connectors);
                self.sessions_write().remove(&session_id);
                tracing::warn!(%key, "connector became occupied during session start");
                return Err(SessionError::ConnectorAlreadyInUse {
                    charger_id: charger_id.to_string(),
                    connector_id,
                });
            }
            connectors.insert(key, session_id.clone());
        }

        tracing::info!(%session_id, charger_id, connector_id, "session started");
        Ok(session)
    }

    /// Stop a session and free its connector.
    ///
    /// Removal from the session map is the linearization point: of two
    /// concurrent stops for the same id exactly one succeeds. The connector
    /// entry is only cleared if it still belongs to this session.
    pub fn stop(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        let session = self.sessions_write().remove(session_id).ok_or_else(|| {
            SessionError::SessionNotFound {
                session_id: session_id.to_string(),
            }
        })?;
        session.set_state(SessionState::Stopping);

        let key = session.connector_key();
        let mut connectors = self.connectors_write();
        if connectors.get(&key).is_some_and(|id| id == session_id) {
            connectors.remove(&key);
        }
        drop(connectors);

        tracing::info!(session_id, "session stopped");
        Ok(session)
    }

    /// Record a power report for a session.
    pub fn update_power(
        &self,
        session_id: &str,
        consumed_power: f64,
        vehicle_max_power: f64,
    ) -> Result<Arc<Session>, SessionError> {
        let session = self
            .session(session_id)
            .ok_or_else(|| SessionError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        if consumed_power < 0.0 || vehicle_max_power < 0.0 || consumed_power > vehicle_max_power {
            return Err(SessionError::InvalidPowerUpdate {
                consumed: consumed_power,
                vehicle_max: vehicle_max_power,
            });
        }
        session.update_power(consumed_power, vehicle_max_power);
        tracing::debug!(
            session_id,
            consumed_power,
            vehicle_max_power,
            "session power updated"
        );
        Ok(session)
    }

    /// Allocator write-back. A session that was stopped mid-computation is
    /// silently skipped.
    pub fn set_allocated(&self, session_id: &str, power: f64) {
        if let Some(session) = self.session(session_id) {
            session.set_allocated_power(power);
        }
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions_read().get(session_id).cloned()
    }

    /// Capture every active session at one moment, in a deterministic order
    /// (by start time, then id). Later mutations do not affect the result.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions_read()
            .values()
            .map(|session| session.snapshot())
            .collect();
        snapshots.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        snapshots
    }

    pub fn is_connector_available(&self, charger_id: &str, connector_id: u32) -> bool {
        let key = ConnectorKey {
            charger_id: charger_id.to_string(),
            connector_id,
        };
        !self.connectors_read().contains_key(&key)
    }

    pub fn active_count(&self) -> usize {
        self.sessions_read().len()
    }

    /// Sum of allocated power over all active sessions, in kW.
    pub fn total_allocated_power(&self) -> f64 {
        self.sessions_read()
            .values()
            .map(|session| session.allocated_power())
            .sum()
    }

    /// Sum of last-reported consumed power over all active sessions, in kW.
    pub fn total_consumed_power(&self) -> f64 {
        self.sessions_read()
            .values()
            .map(|session| session.consumed_power())
            .sum()
    }

    /// Sum of accumulated energy over all active sessions, in kWh.
    pub fn total_energy(&self) -> f64 {
        self.sessions_read()
            .values()
            .map(|session| session.total_energy())
            .sum()
    }

    /// Active sessions grouped by charger id.
    pub fn sessions_by_charger(&self) -> HashMap<String, Vec<SessionSnapshot>> {
        let mut by_charger: HashMap<String, Vec<SessionSnapshot>> = HashMap::new();
        for session in self.sessions_read().values() {
            by_charger
                .entry(session.charger_id().to_string())
                .or_default()
                .push(session.snapshot());
        }
        by_charger
    }
}
