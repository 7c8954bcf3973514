//! Engine-level configuration types and their validation.
//!
//! The surrounding process parses whatever config format it likes and hands
//! these plain structs in. Validation collects every violation instead of
//! bailing on the first, so a broken config is fixed in one round trip.

use std::collections::HashSet;

use thiserror::Error;

/// Geographic location of the installation; feeds the radiation terms of
/// the ET formulas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

/// Which optional weather input channels exist in this installation.
/// Decided once at configuration time; drives ET method selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeatherChannels {
    pub wind_speed: bool,
    pub solar_radiation: bool,
    pub pressure: bool,
    pub forecast_rain: bool,
}

/// Per-zone configuration, immutable during a scheduling cycle. Owned by
/// the caller; the engine only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneConfig {
    pub zone_id: String,
    pub name: String,
    /// Water delivered by the zone's sprinkler, mm/hour.
    pub precipitation_rate: f64,
    /// Multiplier converting reference ET into this zone's actual loss.
    pub crop_coefficient: f64,
    /// Runtime clamp bounds, seconds.
    pub min_runtime: f64,
    pub max_runtime: f64,
    /// Cooldown since the sprinkler last turned off, seconds.
    pub minimum_interval: f64,
    /// Informational balance bounds, mm.
    pub max_balance: f64,
    pub min_balance: f64,
}

#[derive(Debug, Error)]
#[error("invalid configuration ({} issue(s)):\n  - {}", .0.len(), .0.join("\n  - "))]
pub struct ConfigError(pub Vec<String>);

/// Validate all zone configs. Returns `Ok(())` or an error describing every
/// violation found (not just the first one).
pub fn validate_zones(zones: &[ZoneConfig]) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();

    for (i, z) in zones.iter().enumerate() {
        let ctx = || {
            if z.zone_id.is_empty() {
                format!("zones[{i}]")
            } else {
                format!("zone '{}'", z.zone_id)
            }
        };

        // ── Identity ────────────────────────────────────────
        if z.zone_id.trim().is_empty() {
            errors.push(format!("{}: zone_id is empty", ctx()));
        } else if !seen_ids.insert(&z.zone_id) {
            errors.push(format!("{}: duplicate zone_id", ctx()));
        }

        if z.name.trim().is_empty() {
            errors.push(format!("{}: name is empty", ctx()));
        }

        // ── Hydraulics ──────────────────────────────────────
        // The evaluator divides by the rate; zero or negative is undefined
        // input and must never reach it.
        if !(z.precipitation_rate.is_finite() && z.precipitation_rate > 0.0) {
            errors.push(format!(
                "{}: precipitation_rate must be positive, got {}",
                ctx(),
                z.precipitation_rate
            ));
        }
        if !(z.crop_coefficient.is_finite() && z.crop_coefficient > 0.0) {
            errors.push(format!(
                "{}: crop_coefficient must be positive, got {}",
                ctx(),
                z.crop_coefficient
            ));
        }

        // ── Runtime clamp bounds ────────────────────────────
        if !(z.min_runtime.is_finite() && z.min_runtime >= 0.0) {
            errors.push(format!(
                "{}: min_runtime must be non-negative, got {}",
                ctx(),
                z.min_runtime
            ));
        }
        if !(z.max_runtime.is_finite() && z.max_runtime > 0.0) {
            errors.push(format!(
                "{}: max_runtime must be positive, got {}",
                ctx(),
                z.max_runtime
            ));
        }
        if z.max_runtime.is_finite() && z.min_runtime.is_finite() && z.max_runtime < z.min_runtime {
            errors.push(format!(
                "{}: max_runtime ({}) is less than min_runtime ({})",
                ctx(),
                z.max_runtime,
                z.min_runtime
            ));
        }
        if !(z.minimum_interval.is_finite() && z.minimum_interval >= 0.0) {
            errors.push(format!(
                "{}: minimum_interval must be non-negative, got {}",
                ctx(),
                z.minimum_interval
            ));
        }

        // ── Balance bounds ──────────────────────────────────
        if !(z.max_balance.is_finite() && z.min_balance.is_finite()) {
            errors.push(format!("{}: balance bounds must be finite", ctx()));
        } else if z.max_balance <= z.min_balance {
            errors.push(format!(
                "{}: max_balance ({}) must be greater than min_balance ({})",
                ctx(),
                z.max_balance,
                z.min_balance
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError(errors))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
