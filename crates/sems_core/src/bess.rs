use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::models::BatteryConfig;

/// Minimum state of charge kept in reserve, as a fraction of capacity.
const MIN_SOC_FRACTION: f64 = 0.10;
/// Ceiling on state of charge to avoid overcharge, as a fraction of capacity.
const MAX_SOC_FRACTION: f64 = 0.95;
/// Absolute floor below which the battery is considered critical.
const EMERGENCY_SOC_FRACTION: f64 = 0.05;
/// Power is capped so it could be sustained over roughly this horizon.
const SUSTAINABILITY_WINDOW_HOURS: f64 = 0.25;
/// Valley filling only engages above this grid surplus.
const VALLEY_FILL_MIN_SURPLUS_KW: f64 = 10.0;
/// Share of the grid surplus used when valley filling.
const VALLEY_FILL_SURPLUS_SHARE: f64 = 0.5;

#[derive(Debug)]
struct BessState {
    /// State of charge in kWh, within `[0, capacity]`.
    soc: f64,
    /// Positive = discharging, negative = charging, zero = idle.
    current_power: f64,
    last_update: DateTime<Utc>,
}

/// Controller for the station's stationary battery.
///
/// Owns the state of charge and the safety envelope. Every SOC transition is
/// one locked read-modify-write section, so concurrent discharge/charge
/// requests serialize against the floors and ceilings, and the returned
/// actual power reflects what was applied under contention. Constructed
/// without a battery it reports unavailable and all operations return zero.
pub struct BessController {
    capacity: f64,
    max_power: f64,
    state: Mutex<BessState>,
}

impl BessController {
    /// Build from the optional battery section of the station configuration.
    /// The battery starts fully charged.
    pub fn new(config: Option<&BatteryConfig>) -> Self {
        let (capacity, max_power) = match config {
            Some(battery) => (battery.capacity.max(0.0), battery.power.max(0.0)),
            None => (0.0, 0.0),
        };
        if capacity > 0.0 {
            tracing::info!(capacity, max_power, "BESS controller initialized, SOC=100%");
        } else {
            tracing::info!("BESS controller initialized without battery");
        }
        BessController {
            capacity,
            max_power,
            state: Mutex::new(BessState {
                soc: capacity,
                current_power: 0.0,
                last_update: Utc::now(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, BessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a usable battery is configured.
    pub fn is_available(&self) -> bool {
        self.capacity > 0.0 && self.max_power > 0.0
    }

    fn min_reserve(&self) -> f64 {
        self.capacity * MIN_SOC_FRACTION
    }

    fn max_energy(&self) -> f64 {
        self.capacity * MAX_SOC_FRACTION
    }

    fn available_discharge_at(&self, soc: f64) -> f64 {
        if !self.is_available() || soc <= self.min_reserve() {
            return 0.0;
        }
        let available_energy = soc - self.min_reserve();
        self.max_power
            .min(available_energy / SUSTAINABILITY_WINDOW_HOURS)
            .max(0.0)
    }

    fn available_charge_at(&self, soc: f64) -> f64 {
        if !self.is_available() || soc >= self.max_energy() {
            return 0.0;
        }
        let headroom = self.max_energy() - soc;
        self.max_power
            .min(headroom / SUSTAINABILITY_WINDOW_HOURS)
            .max(0.0)
    }

    /// Maximum discharge power currently available, in kW.
    ///
    /// Limited by the power rating and by the energy above the minimum
    /// reserve spread over the sustainability window.
    pub fn available_discharge(&self) -> f64 {
        self.available_discharge_at(self.state().soc)
    }

    /// Maximum charge power currently acceptable, in kW.
    pub fn available_charge(&self) -> f64 {
        self.available_charge_at(self.state().soc)
    }

    /// Discharge for the given duration, returning the power actually
    /// delivered. Non-positive power or duration is a no-op returning 0.
    pub fn discharge(&self, requested_kw: f64, duration_secs: f64) -> f64 {
        if !self.is_available() || requested_kw <= 0.0 || duration_secs <= 0.0 {
            return 0.0;
        }
        let mut state = self.state();
        let actual = requested_kw.min(self.available_discharge_at(state.soc));
        if actual <= 0.0 {
            return 0.0;
        }
        let energy = actual * (duration_secs / 3600.0);
        let old_soc = state.soc;
        state.soc = (state.soc - energy).max(self.min_reserve());
        state.current_power = actual;
        state.last_update = Utc::now();
        tracing::debug!(
            actual,
            duration_secs,
            old_soc,
            new_soc = state.soc,
            "BESS discharge"
        );
        actual
    }

    /// Charge for the given duration, returning the power actually absorbed.
    /// Non-positive power or duration is a no-op returning 0.
    pub fn charge(&self, requested_kw: f64, duration_secs: f64) -> f64 {
        if !self.is_available() || requested_kw <= 0.0 || duration_secs <= 0.0 {
            return 0.0;
        }
        let mut state = self.state();
        let actual = requested_kw.min(self.available_charge_at(state.soc));
        if actual <= 0.0 {
            return 0.0;
        }
        let energy = actual * (duration_secs / 3600.0);
        let old_soc = state.soc;
        state.soc = (state.soc + energy).min(self.max_energy());
        state.current_power = -actual;
        state.last_update = Utc::now();
        tracing::debug!(
            actual,
            duration_secs,
            old_soc,
            new_soc = state.soc,
            "BESS charge"
        );
        actual
    }

    /// Stop any power flow. The state of charge is unchanged.
    pub fn set_idle(&self) {
        let mut state = self.state();
        state.current_power = 0.0;
        state.last_update = Utc::now();
    }

    /// Critically low state of charge. Documents a condition; the SOC floors
    /// themselves are enforced by `discharge`.
    pub fn is_emergency_state(&self) -> bool {
        self.is_available() && self.state().soc <= self.capacity * EMERGENCY_SOC_FRACTION
    }

    /// Peak-shave / valley-fill recommendation for the given grid load.
    ///
    /// Positive = discharge to relieve the grid, negative = charge from
    /// surplus, zero = no action.
    pub fn calculate_optimal_power(
        &self,
        grid_load: f64,
        grid_capacity: f64,
        safety_margin: f64,
    ) -> f64 {
        if !self.is_available() {
            return 0.0;
        }
        let effective_capacity = grid_capacity - safety_margin;

        if grid_load > effective_capacity {
            let required = grid_load - effective_capacity;
            return required.min(self.available_discharge());
        }

        let surplus = effective_capacity - grid_load;
        if surplus > VALLEY_FILL_MIN_SURPLUS_KW {
            return -(surplus * VALLEY_FILL_SURPLUS_SHARE).min(self.available_charge());
        }

        0.0
    }

    /// State of charge in kWh.
    pub fn soc(&self) -> f64 {
        self.state().soc
    }

    /// State of charge as a percentage of capacity.
    pub fn soc_percentage(&self) -> f64 {
        if self.capacity <= 0.0 {
            return 0.0;
        }
        self.state().soc / self.capacity * 100.0
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn max_power(&self) -> f64 {
        self.max_power
    }

    /// Current power flow (positive = discharging, negative = charging).
    pub fn current_power(&self) -> f64 {
        self.state().current_power
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.state().last_update
    }
}
