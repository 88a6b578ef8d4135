use thiserror::Error;

/// Domain errors returned by the session registry.
///
/// These map to status codes at the facade; the allocator and the BESS
/// controller never fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("unknown charger: {charger_id}")]
    UnknownCharger { charger_id: String },

    #[error("connector {connector_id} out of range for charger {charger_id}")]
    ConnectorOutOfRange {
        charger_id: String,
        connector_id: u32,
    },

    #[error("connector {charger_id}:{connector_id} is already in use")]
    ConnectorAlreadyInUse {
        charger_id: String,
        connector_id: u32,
    },

    #[error("session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("invalid power update: consumed={consumed}kW, vehicleMax={vehicle_max}kW")]
    InvalidPowerUpdate { consumed: f64, vehicle_max: f64 },

    #[error("session id collision: {session_id}")]
    SessionIdCollision { session_id: String },
}
