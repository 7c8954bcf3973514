//! Update pipeline: reacts to sensor changes, sprinkler transitions, and
//! timer ticks, and drives the observation store, ET engine, ledger, and
//! evaluator in the correct order.
//!
//! The [`Controller`] is an explicit context object owned by the process
//! lifecycle: one instance per configured installation, passed to every
//! operation. Nothing here reads the wall clock or performs I/O; callers
//! supply `now` and push the returned updates to their sinks.

use std::collections::BTreeMap;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::config::{validate_zones, ConfigError, Location, WeatherChannels, ZoneConfig};
use crate::et::{compute_et0, EtError, EtInputs, EtMethod};
use crate::evaluate::{evaluate, CalculatedSnapshot};
use crate::ledger::Ledger;
use crate::weather::{DailyMeans, ObservationStore, WeatherVariable};

// ---------------------------------------------------------------------------
// Construction + outputs
// ---------------------------------------------------------------------------

/// Everything the controller needs at construction time.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub location: Location,
    pub channels: WeatherChannels,
    pub zones: Vec<ZoneConfig>,
}

/// Snapshot of one zone, produced after every mutation for the caller to
/// push to all interested sinks through one typed interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneUpdate {
    pub zone_id: String,
    pub balance_mm: f64,
    pub runtime_today_seconds: f64,
    pub last_et_mm: f64,
    pub last_rainfall_mm: f64,
    pub snapshot: CalculatedSnapshot,
}

/// What a daily rollover did.
#[derive(Debug, Clone)]
pub struct RolloverReport {
    pub et0_mm: f64,
    /// The formula that actually ran.
    pub method: EtMethod,
    /// True when the configured method's extra inputs were missing for the
    /// day and the temperature-only formula substituted.
    pub downgraded: bool,
    pub sample_count: usize,
    pub updates: Vec<ZoneUpdate>,
}

/// Outcome of one observed sprinkler state event.
#[derive(Debug, Clone, PartialEq)]
pub enum SprinklerOutcome {
    /// Idle → Active transition; an irrigation interval is now open.
    TurnedOn,
    /// Active → Idle transition; water was credited.
    TurnedOff(ZoneUpdate),
    /// Repeated observation of the current state; nothing changed.
    Ignored,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Controller {
    location: Location,
    method: EtMethod,
    store: ObservationStore,
    ledger: Ledger,
    configs: BTreeMap<String, ZoneConfig>,
    forecast_rain_mm: f64,
    last_et0: Option<f64>,
    last_update: Option<OffsetDateTime>,
}

impl Controller {
    pub fn new(cfg: ControllerConfig) -> Result<Self, ConfigError> {
        validate_zones(&cfg.zones)?;
        let method = EtMethod::select(&cfg.channels);
        info!(%method, "selected reference ET method from configured channels");
        let ledger = Ledger::new(cfg.zones.iter().map(|z| z.zone_id.clone()));
        let configs = cfg
            .zones
            .into_iter()
            .map(|z| (z.zone_id.clone(), z))
            .collect();
        Ok(Self {
            location: cfg.location,
            method,
            store: ObservationStore::new(),
            ledger,
            configs,
            forecast_rain_mm: 0.0,
            last_et0: None,
            last_update: None,
        })
    }

    pub fn method(&self) -> EtMethod {
        self.method
    }

    pub fn last_et0(&self) -> Option<f64> {
        self.last_et0
    }

    pub fn last_update(&self) -> Option<OffsetDateTime> {
        self.last_update
    }

    pub fn zone_ids(&self) -> Vec<String> {
        self.ledger.zone_ids()
    }

    pub fn forecast_rain_mm(&self) -> f64 {
        self.forecast_rain_mm
    }

    /// Read-only view of one zone's ledger state.
    pub fn zone(&self, zone_id: &str) -> Option<&crate::ledger::ZoneState> {
        self.ledger.zone(zone_id)
    }

    // -- events ------------------------------------------------------------

    /// Route a raw weather reading. Rejected readings are logged and
    /// dropped without touching prior state. A positive precipitation delta
    /// is credited to every zone and triggers re-evaluation; other accepted
    /// readings only accumulate.
    pub fn record_weather(
        &mut self,
        variable: WeatherVariable,
        value: f64,
        now: OffsetDateTime,
    ) -> Vec<ZoneUpdate> {
        self.last_update = Some(now);
        match variable {
            WeatherVariable::Precipitation => match self.store.record_precipitation(value) {
                Ok(Some(delta)) => {
                    info!(delta_mm = format!("{delta:.2}"), "rainfall detected");
                    for zone_id in self.ledger.zone_ids() {
                        self.ledger.add_rainfall(&zone_id, delta);
                    }
                    self.evaluate_all(now)
                }
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(%e, "rejected precipitation reading");
                    Vec::new()
                }
            },
            _ => {
                if let Err(e) = self.store.record(variable, value) {
                    warn!(%e, "rejected weather reading");
                }
                Vec::new()
            }
        }
    }

    /// Sprinkler activity state machine: Idle → Active on a turn-on event,
    /// Active → Idle on a turn-off event. Repeated observations of the same
    /// state are no-ops, guarded by comparing the previously observed state.
    pub fn sprinkler_changed(
        &mut self,
        zone_id: &str,
        on: bool,
        now: OffsetDateTime,
    ) -> SprinklerOutcome {
        self.last_update = Some(now);
        let Some(zone) = self.ledger.zone(zone_id) else {
            warn!(zone = %zone_id, "sprinkler event for unknown zone — ignoring");
            return SprinklerOutcome::Ignored;
        };
        let active = zone.sprinkler_on_time.is_some();
        match (active, on) {
            (false, true) => {
                self.ledger.begin_irrigation(zone_id, now);
                info!(zone = %zone_id, "sprinkler turned on");
                SprinklerOutcome::TurnedOn
            }
            (true, false) => {
                let rate = self.configs[zone_id].precipitation_rate;
                self.ledger.end_irrigation(zone_id, now, rate);
                SprinklerOutcome::TurnedOff(self.evaluate_zone(zone_id, now))
            }
            (true, true) => {
                debug!(zone = %zone_id, "sprinkler already on — ignoring repeated event");
                SprinklerOutcome::Ignored
            }
            (false, false) => {
                debug!(zone = %zone_id, "sprinkler off while idle — ignoring");
                SprinklerOutcome::Ignored
            }
        }
    }

    /// Retain the latest forecast rainfall (floored at 0) and re-evaluate
    /// every zone against it.
    pub fn set_forecast_rain(&mut self, mm: f64, now: OffsetDateTime) -> Vec<ZoneUpdate> {
        self.forecast_rain_mm = mm.max(0.0);
        self.evaluate_all(now)
    }

    /// Manual override: an authoritative overwrite of the balance, followed
    /// immediately by re-evaluation.
    pub fn override_balance(
        &mut self,
        zone_id: &str,
        value: f64,
        now: OffsetDateTime,
    ) -> Option<ZoneUpdate> {
        if !self.ledger.set_balance(zone_id, value) {
            warn!(zone = %zone_id, "balance override for unknown zone — ignoring");
            return None;
        }
        info!(zone = %zone_id, balance_mm = value, "soil moisture balance overridden");
        Some(self.evaluate_zone(zone_id, now))
    }

    /// Periodic idempotent re-evaluation of every zone. Side-effect free
    /// except for storing the recomputed snapshots; the caller owns the
    /// push-to-sink step.
    pub fn evaluate_all(&mut self, now: OffsetDateTime) -> Vec<ZoneUpdate> {
        let ids = self.ledger.zone_ids();
        ids.iter().map(|id| self.evaluate_zone(id, now)).collect()
    }

    fn evaluate_zone(&mut self, zone_id: &str, now: OffsetDateTime) -> ZoneUpdate {
        let cfg = &self.configs[zone_id];
        let zone = self
            .ledger
            .zone(zone_id)
            .expect("zone configs and ledger in sync");
        let snapshot = evaluate(zone, cfg, self.forecast_rain_mm, now);
        let update = ZoneUpdate {
            zone_id: zone_id.to_string(),
            balance_mm: zone.soil_moisture_balance,
            runtime_today_seconds: zone.total_sprinkler_runtime_today,
            last_et_mm: zone.last_et,
            last_rainfall_mm: zone.last_rainfall,
            snapshot: snapshot.clone(),
        };
        self.ledger
            .zone_mut(zone_id)
            .expect("zone configs and ledger in sync")
            .calculated = snapshot;
        update
    }

    // -- daily rollover ----------------------------------------------------

    /// Daily rollover, observation mode A: consume the store's own
    /// accumulated means.
    pub fn daily_rollover(&mut self, now: OffsetDateTime) -> Result<RolloverReport, EtError> {
        let means = self.store.daily_means();
        self.rollover_with_means(means, now)
    }

    /// Daily rollover, observation mode B: the caller fetched the prior
    /// day's window from the historical store and re-validated it into
    /// means.
    pub fn daily_rollover_with(
        &mut self,
        means: DailyMeans,
        now: OffsetDateTime,
    ) -> Result<RolloverReport, EtError> {
        self.rollover_with_means(means, now)
    }

    /// The strict rollover sequence: means → ET0 → apply to every zone →
    /// store reset, as one synchronous unit. The once-per-day store reset
    /// happens on every path, including the insufficient-data skip, so
    /// samples never leak across day boundaries.
    fn rollover_with_means(
        &mut self,
        means: DailyMeans,
        now: OffsetDateTime,
    ) -> Result<RolloverReport, EtError> {
        self.last_update = Some(now);
        let inputs = match EtInputs::resolve(self.method, &means) {
            Ok(inputs) => inputs,
            Err(e) => {
                warn!(%e, "skipping ET application for the day — balances unchanged");
                self.store.reset_day();
                return Err(e);
            }
        };
        let method = inputs.method();
        let downgraded = method != self.method;

        // The means describe the day that just ended.
        let day = (now - Duration::days(1)).date();
        let et0 = compute_et0(&inputs, &self.location, day);
        self.last_et0 = Some(et0);
        info!(
            et0_mm = format!("{et0:.2}"),
            %method,
            downgraded,
            samples = means.sample_count,
            "computed daily reference ET"
        );

        let mut updates = Vec::with_capacity(self.configs.len());
        for zone_id in self.ledger.zone_ids() {
            let kc = self.configs[&zone_id].crop_coefficient;
            self.ledger.apply_daily_et(&zone_id, et0, kc, now);
            updates.push(self.evaluate_zone(&zone_id, now));
        }
        self.store.reset_day();

        Ok(RolloverReport {
            et0_mm: et0,
            method,
            downgraded,
            sample_count: means.sample_count,
            updates,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
