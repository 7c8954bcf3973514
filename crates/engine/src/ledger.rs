//! Per-zone soil moisture ledger.
//!
//! The balance is a plain signed accumulator in mm: 0 is optimal, positive
//! is surplus, negative is deficit. Rainfall and irrigation add to it and
//! the daily ET application subtracts from it. Nothing here ever clamps it;
//! clamping happens only in the scheduling evaluator's runtime output.

use std::collections::BTreeMap;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::evaluate::CalculatedSnapshot;

/// Mutable state for one irrigation zone.
///
/// `sprinkler_on_time` and `sprinkler_off_time` are never both set: exactly
/// one open-interval marker exists while the zone's sprinkler is active.
#[derive(Debug, Clone, Default)]
pub struct ZoneState {
    /// Soil moisture balance, mm. Signed and unbounded.
    pub soil_moisture_balance: f64,
    /// Most recent rain event credited to this zone, mm.
    pub last_rainfall: f64,
    /// Most recent crop-scaled ET subtraction, mm.
    pub last_et: f64,
    pub last_et_calculation: Option<OffsetDateTime>,
    pub sprinkler_on_time: Option<OffsetDateTime>,
    pub sprinkler_off_time: Option<OffsetDateTime>,
    /// Seconds of sprinkler runtime accumulated since the last rollover.
    pub total_sprinkler_runtime_today: f64,
    /// Derived snapshot, fully recomputed on each evaluation.
    pub calculated: CalculatedSnapshot,
}

/// All zones' ledger state, keyed by zone id.
#[derive(Debug, Default)]
pub struct Ledger {
    zones: BTreeMap<String, ZoneState>,
}

impl Ledger {
    pub fn new(zone_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            zones: zone_ids
                .into_iter()
                .map(|id| (id, ZoneState::default()))
                .collect(),
        }
    }

    pub fn zone(&self, zone_id: &str) -> Option<&ZoneState> {
        self.zones.get(zone_id)
    }

    pub fn zone_mut(&mut self, zone_id: &str) -> Option<&mut ZoneState> {
        self.zones.get_mut(zone_id)
    }

    pub fn zone_ids(&self) -> Vec<String> {
        self.zones.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ZoneState)> {
        self.zones.iter()
    }

    /// Credit a rain event. Callers only pass positive deltas; a shrinking
    /// rain counter is not a rain event and never reaches the ledger.
    pub fn add_rainfall(&mut self, zone_id: &str, mm: f64) {
        let Some(zone) = self.zones.get_mut(zone_id) else {
            warn!(zone = %zone_id, "rainfall for unknown zone — ignoring");
            return;
        };
        zone.soil_moisture_balance += mm;
        zone.last_rainfall = mm;
    }

    /// Open an irrigation interval: stamp the on time and clear the off
    /// marker so exactly one open-interval marker exists.
    pub fn begin_irrigation(&mut self, zone_id: &str, now: OffsetDateTime) {
        let Some(zone) = self.zones.get_mut(zone_id) else {
            warn!(zone = %zone_id, "irrigation start for unknown zone — ignoring");
            return;
        };
        zone.sprinkler_on_time = Some(now);
        zone.sprinkler_off_time = None;
    }

    /// Close an irrigation interval and credit the delivered water:
    /// rate (mm/h) × duration (h). Also accumulates the daily runtime
    /// counter. A close without a matching open is a logged no-op.
    pub fn end_irrigation(
        &mut self,
        zone_id: &str,
        now: OffsetDateTime,
        precipitation_rate: f64,
    ) -> Option<f64> {
        let Some(zone) = self.zones.get_mut(zone_id) else {
            warn!(zone = %zone_id, "irrigation stop for unknown zone — ignoring");
            return None;
        };
        let Some(started) = zone.sprinkler_on_time.take() else {
            warn!(zone = %zone_id, "sprinkler off without a matching on — ignoring");
            return None;
        };
        let runtime_seconds = (now - started).as_seconds_f64().max(0.0);
        let water_added = precipitation_rate * runtime_seconds / 3600.0;
        zone.soil_moisture_balance += water_added;
        zone.total_sprinkler_runtime_today += runtime_seconds;
        zone.sprinkler_off_time = Some(now);
        info!(
            zone = %zone_id,
            runtime_s = format!("{runtime_seconds:.0}"),
            water_mm = format!("{water_added:.2}"),
            "irrigation interval closed"
        );
        Some(water_added)
    }

    /// Day rollover for one zone: subtract crop-scaled ET, stamp the
    /// calculation, and reset the daily runtime counter. Returns the
    /// subtracted amount.
    pub fn apply_daily_et(
        &mut self,
        zone_id: &str,
        et0: f64,
        crop_coefficient: f64,
        now: OffsetDateTime,
    ) -> Option<f64> {
        let zone = self.zones.get_mut(zone_id)?;
        let et_actual = et0 * crop_coefficient;
        zone.soil_moisture_balance -= et_actual;
        zone.last_et = et_actual;
        zone.last_et_calculation = Some(now);
        zone.total_sprinkler_runtime_today = 0.0;
        Some(et_actual)
    }

    /// Authoritative overwrite from a manual override; an absolute value,
    /// not a delta. Returns false for an unknown zone.
    pub fn set_balance(&mut self, zone_id: &str, value: f64) -> bool {
        match self.zones.get_mut(zone_id) {
            Some(zone) => {
                zone.soil_moisture_balance = value;
                true
            }
            None => false,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
