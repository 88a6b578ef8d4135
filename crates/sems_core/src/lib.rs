//! Allocation core of the station energy management system.
//!
//! Three components, composed leaves-first:
//!
//! - [`BessController`] models the stationary battery: state of charge,
//!   safety envelope, peak-shave / valley-fill policy.
//! - [`SessionRegistry`] owns the active sessions and the connector index,
//!   and enforces connector exclusivity under concurrency.
//! - [`Allocator`] turns a registry snapshot into a proportional-fair power
//!   allocation under vehicle, charger, grid and battery constraints, and
//!   drives the battery from the resulting load.
//!
//! The crate performs no I/O; the HTTP surface lives in `sems_api` and the
//! event-driven facade in `sems_engine`.

mod allocator;
mod bess;
mod error;
mod models;
mod registry;
mod session;

pub use allocator::{Allocator, GRID_SAFETY_MARGIN_KW, STATIC_LOAD_KW};
pub use bess::BessController;
pub use error::SessionError;
pub use models::{BatteryConfig, ChargerConfig, ConnectorKey, StationConfig};
pub use registry::SessionRegistry;
pub use session::{Session, SessionSnapshot, SessionState};
