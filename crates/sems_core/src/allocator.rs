use std::collections::HashMap;
use std::sync::Arc;

use crate::bess::BessController;
use crate::models::{ChargerConfig, StationConfig};
use crate::registry::SessionRegistry;
use crate::session::SessionSnapshot;

/// Station auxiliary draw in kW, always reserved off the grid budget.
pub const STATIC_LOAD_KW: f64 = 3.0;
/// Headroom kept below the grid capacity in kW.
pub const GRID_SAFETY_MARGIN_KW: f64 = 5.0;

const MAX_ITERATIONS: usize = 20;
const CONVERGENCE_THRESHOLD_KW: f64 = 0.01;
const BINARY_SEARCH_ITERATIONS: usize = 15;
/// Floor for water-fill weights, avoids division by a zero allocation.
const EPSILON_KW: f64 = 1e-3;
/// Assumed interval between allocator runs, used for BESS energy accounting.
const BESS_UPDATE_WINDOW_SECS: f64 = 300.0;
/// Below this fraction of grid capacity the station is in the charging valley.
const VALLEY_FILL_LOAD_FRACTION: f64 = 0.7;
/// Share of spare grid capacity used to recharge the battery.
const VALLEY_FILL_SPARE_SHARE: f64 = 0.5;

/// Computes power allocations for the active sessions.
///
/// Stateless per call: each `recompute` reads a registry snapshot, solves the
/// constrained proportional-fair split, writes the result back per session
/// and drives the battery from the realized load. Concurrent calls are safe;
/// the per-session write-backs make the last computation win.
pub struct Allocator {
    grid_capacity: f64,
    chargers: HashMap<String, ChargerConfig>,
    registry: Arc<SessionRegistry>,
    bess: Arc<BessController>,
}

impl Allocator {
    pub fn new(
        config: &StationConfig,
        registry: Arc<SessionRegistry>,
        bess: Arc<BessController>,
    ) -> Self {
        let chargers = config
            .chargers
            .iter()
            .map(|charger| (charger.id.clone(), charger.clone()))
            .collect();
        Allocator {
            grid_capacity: config.grid_capacity,
            chargers,
            registry,
            bess,
        }
    }

    /// Recompute allocations for every active session.
    ///
    /// Returns the session id → allocated kW map that was written back.
    pub fn recompute(&self) -> HashMap<String, f64> {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            if self.bess.is_available() {
                self.bess.set_idle();
            }
            return HashMap::new();
        }

        let grid_budget = (self.grid_capacity - STATIC_LOAD_KW - GRID_SAFETY_MARGIN_KW).max(0.0);
        let bess_budget = if self.bess.is_available() {
            self.bess.available_discharge()
        } else {
            0.0
        };
        let total_budget = grid_budget + bess_budget;
        tracing::debug!(grid_budget, bess_budget, total_budget, "allocation budget");

        if total_budget <= 0.0 {
            tracing::warn!("no power available for allocation");
            return self.write_back(&snapshot, &vec![0.0; snapshot.len()]);
        }

        let caps: Vec<f64> = snapshot.iter().map(|s| s.vehicle_max_power).collect();
        let mut allocations = water_fill(&caps, total_budget);

        enforce_charger_caps(&snapshot, &self.chargers, &mut allocations);

        let total: f64 = allocations.iter().sum();
        if total > total_budget {
            let scale = total_budget / total;
            for allocation in &mut allocations {
                *allocation *= scale;
            }
        }

        let result = self.write_back(&snapshot, &allocations);

        if self.bess.is_available() {
            self.update_bess(allocations.iter().sum());
        }

        tracing::debug!(
            sessions = snapshot.len(),
            total_allocated = allocations.iter().sum::<f64>(),
            "allocations computed"
        );
        result
    }

    fn write_back(
        &self,
        snapshot: &[SessionSnapshot],
        allocations: &[f64],
    ) -> HashMap<String, f64> {
        let mut result = HashMap::with_capacity(snapshot.len());
        for (session, allocation) in snapshot.iter().zip(allocations) {
            self.registry.set_allocated(&session.session_id, *allocation);
            result.insert(session.session_id.clone(), *allocation);
        }
        result
    }

    /// Peak shaving / valley filling from the realized station load.
    fn update_bess(&self, total_allocated: f64) {
        let realized_load = total_allocated + STATIC_LOAD_KW;

        if realized_load > self.grid_capacity {
            let excess = realized_load - self.grid_capacity;
            let delivered = self.bess.discharge(excess, BESS_UPDATE_WINDOW_SECS);
            tracing::debug!(excess, delivered, "BESS peak shaving");
        } else if realized_load < VALLEY_FILL_LOAD_FRACTION * self.grid_capacity {
            let spare = self.grid_capacity - realized_load;
            let absorbed = self
                .bess
                .charge(spare * VALLEY_FILL_SPARE_SHARE, BESS_UPDATE_WINDOW_SECS);
            tracing::debug!(spare, absorbed, "BESS valley filling");
        } else {
            self.bess.set_idle();
        }
    }
}

/// Proportional-fair water-fill.
///
/// Maximizes `Σ log(a_i)` subject to `Σ a_i ≤ target_total` and
/// `0 ≤ a_i ≤ caps[i]`. Each round binary-searches the water level λ for the
/// capped update `a_i ← min(caps[i], λ·a_i)` until the largest per-session
/// change drops below the convergence threshold. The epsilon floor only
/// backs the weights, so a zero cap yields an exact zero.
fn water_fill(caps: &[f64], target_total: f64) -> Vec<f64> {
    let mut allocations = vec![EPSILON_KW; caps.len()];

    for _ in 0..MAX_ITERATIONS {
        let lambda = find_water_level(&allocations, caps, target_total);

        let mut max_change: f64 = 0.0;
        for (allocation, cap) in allocations.iter_mut().zip(caps) {
            let next = cap.min(lambda * allocation.max(EPSILON_KW));
            max_change = max_change.max((next - *allocation).abs());
            *allocation = next;
        }

        if max_change < CONVERGENCE_THRESHOLD_KW {
            break;
        }
    }

    allocations
}

/// Binary search for the water level λ whose capped sum meets the target.
fn find_water_level(allocations: &[f64], caps: &[f64], target_total: f64) -> f64 {
    let mut low = 0.0;
    let mut high = target_total * 1000.0;

    for _ in 0..BINARY_SEARCH_ITERATIONS {
        let lambda = (low + high) / 2.0;
        let total: f64 = allocations
            .iter()
            .zip(caps)
            .map(|(allocation, cap)| cap.min(lambda * allocation.max(EPSILON_KW)))
            .sum();
        if total > target_total {
            high = lambda;
        } else {
            low = lambda;
        }
    }

    (low + high) / 2.0
}

/// Scale each charger's sessions down uniformly where their sum exceeds the
/// charger's shared power limit.
fn enforce_charger_caps(
    snapshot: &[SessionSnapshot],
    chargers: &HashMap<String, ChargerConfig>,
    allocations: &mut [f64],
) {
    let mut by_charger: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, session) in snapshot.iter().enumerate() {
        by_charger
            .entry(session.charger_id.as_str())
            .or_default()
            .push(index);
    }

    for (charger_id, indexes) in by_charger {
        let Some(charger) = chargers.get(charger_id) else {
            tracing::warn!(charger_id, "unknown charger id in snapshot, skipping cap");
            continue;
        };
        let charger_total: f64 = indexes.iter().map(|&i| allocations[i]).sum();
        if charger_total > charger.max_power && charger_total > 0.0 {
            let scale = charger.max_power / charger_total;
            for &index in &indexes {
                allocations[index] *= scale;
            }
            tracing::debug!(
                charger_id,
                charger_total,
                cap = charger.max_power,
                "scaled allocations to charger cap"
            );
        }
    }
}
