//! Scheduling evaluator: a pure function from ledger state, zone
//! configuration, forecast rain, and the current instant to a run/no-run
//! verdict with a required runtime.
//!
//! Conditions are checked in a fixed order and the first failing one wins.
//! The snapshot is always fully populated; runtime fields report 0 where the
//! winning branch never computed them, and the clamped runtime is 0 whenever
//! the zone cannot run.

use std::fmt;

use serde::{Serialize, Serializer};
use time::OffsetDateTime;

use crate::config::ZoneConfig;
use crate::ledger::ZoneState;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Why a zone can or cannot run right now. Quantities ride along so the
/// rendered reason carries the numbers that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    MinimumIntervalNotMet { since_off_s: f64, required_s: f64 },
    NoMoistureDeficit,
    ForecastCoversDeficit { forecast_rain_mm: f64 },
    RuntimeTooShort { required_s: f64, min_runtime_s: f64 },
    ReadyToRun,
    /// Placeholder before the first evaluation runs.
    NotEvaluated,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::MinimumIntervalNotMet {
                since_off_s,
                required_s,
            } => write!(
                f,
                "minimum interval not met ({since_off_s:.0}s < {required_s:.0}s)"
            ),
            Reason::NoMoistureDeficit => write!(f, "no moisture deficit"),
            Reason::ForecastCoversDeficit { forecast_rain_mm } => write!(
                f,
                "forecast rain ({forecast_rain_mm:.1}mm) covers deficit"
            ),
            Reason::RuntimeTooShort {
                required_s,
                min_runtime_s,
            } => write!(
                f,
                "runtime too short ({required_s:.0}s < {min_runtime_s:.0}s minimum)"
            ),
            Reason::ReadyToRun => write!(f, "ready to run"),
            Reason::NotEvaluated => write!(f, "not evaluated yet"),
        }
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Default for Reason {
    fn default() -> Self {
        Reason::NotEvaluated
    }
}

/// Fully recomputed on each evaluation, never incrementally patched.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct CalculatedSnapshot {
    pub effective_deficit_mm: f64,
    pub required_runtime_seconds: f64,
    pub clamped_runtime_seconds: f64,
    pub forecast_rain_mm: f64,
    pub can_run: bool,
    pub reason: Reason,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Decide whether and how long the zone should run. Pure: the same inputs
/// always yield the same snapshot and nothing is mutated.
///
/// `precipitation_rate <= 0` is rejected at configuration time and never
/// reaches this division.
pub fn evaluate(
    zone: &ZoneState,
    cfg: &ZoneConfig,
    forecast_rain_mm: f64,
    now: OffsetDateTime,
) -> CalculatedSnapshot {
    let balance = zone.soil_moisture_balance;
    // Once the balance is non-negative the effective deficit is 0
    // unconditionally, whatever the forecast says.
    let effective_deficit = if balance >= 0.0 {
        0.0
    } else {
        (balance.abs() - forecast_rain_mm).max(0.0)
    };

    let blocked = |reason: Reason, required_runtime_seconds: f64| CalculatedSnapshot {
        effective_deficit_mm: effective_deficit,
        required_runtime_seconds,
        clamped_runtime_seconds: 0.0,
        forecast_rain_mm,
        can_run: false,
        reason,
    };

    if let Some(off_time) = zone.sprinkler_off_time {
        let since_off = (now - off_time).as_seconds_f64();
        if since_off < cfg.minimum_interval {
            return blocked(
                Reason::MinimumIntervalNotMet {
                    since_off_s: since_off,
                    required_s: cfg.minimum_interval,
                },
                0.0,
            );
        }
    }

    if balance >= 0.0 {
        return blocked(Reason::NoMoistureDeficit, 0.0);
    }

    if effective_deficit <= 0.0 {
        return blocked(Reason::ForecastCoversDeficit { forecast_rain_mm }, 0.0);
    }

    let required = effective_deficit / cfg.precipitation_rate * 3600.0;
    if required < cfg.min_runtime {
        return blocked(
            Reason::RuntimeTooShort {
                required_s: required,
                min_runtime_s: cfg.min_runtime,
            },
            required,
        );
    }

    CalculatedSnapshot {
        effective_deficit_mm: effective_deficit,
        required_runtime_seconds: required,
        clamped_runtime_seconds: required.clamp(cfg.min_runtime, cfg.max_runtime),
        forecast_rain_mm,
        can_run: true,
        reason: Reason::ReadyToRun,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
