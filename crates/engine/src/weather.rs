//! Validated weather observation store.
//!
//! Raw sensor readings are checked against a fixed physical range per
//! variable before anything is retained; an out-of-range reading is rejected
//! and never stored. Accepted samples accumulate per calendar day and are
//! consumed as arithmetic means at the daily rollover, after which the store
//! must be reset exactly once so samples never leak across day boundaries.

use std::fmt;
use std::ops::RangeInclusive;

use thiserror::Error;
use tracing::{debug, warn};

/// Largest plausible single increase of the cumulative rain counter.
/// Bigger jumps are treated as a sensor glitch and rejected.
pub const MAX_RAIN_DELTA_MM: f64 = 200.0;

// ---------------------------------------------------------------------------
// Variables and their valid ranges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeatherVariable {
    /// Air temperature, °C.
    Temperature,
    /// Relative humidity, %.
    Humidity,
    /// Wind speed, km/h.
    WindSpeed,
    /// Shortwave solar radiation, W/m².
    SolarRadiation,
    /// Barometric pressure, hPa.
    Pressure,
    /// Cumulative precipitation counter, mm.
    Precipitation,
}

impl WeatherVariable {
    pub const ALL: [WeatherVariable; 6] = [
        WeatherVariable::Temperature,
        WeatherVariable::Humidity,
        WeatherVariable::WindSpeed,
        WeatherVariable::SolarRadiation,
        WeatherVariable::Pressure,
        WeatherVariable::Precipitation,
    ];

    /// Valid range for a single raw reading of this variable.
    pub fn valid_range(self) -> RangeInclusive<f64> {
        match self {
            WeatherVariable::Temperature => -50.0..=60.0,
            WeatherVariable::Humidity => 0.0..=100.0,
            WeatherVariable::WindSpeed => 0.0..=200.0,
            WeatherVariable::SolarRadiation => 0.0..=1500.0,
            WeatherVariable::Pressure => 800.0..=1100.0,
            WeatherVariable::Precipitation => 0.0..=500.0,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            WeatherVariable::Temperature => "°C",
            WeatherVariable::Humidity => "%",
            WeatherVariable::WindSpeed => "km/h",
            WeatherVariable::SolarRadiation => "W/m²",
            WeatherVariable::Pressure => "hPa",
            WeatherVariable::Precipitation => "mm",
        }
    }

    /// Stable lowercase identifier used in topics, logs, and the history
    /// store.
    pub fn key(self) -> &'static str {
        match self {
            WeatherVariable::Temperature => "temperature",
            WeatherVariable::Humidity => "humidity",
            WeatherVariable::WindSpeed => "wind_speed",
            WeatherVariable::SolarRadiation => "solar_radiation",
            WeatherVariable::Pressure => "pressure",
            WeatherVariable::Precipitation => "precipitation",
        }
    }

    fn index(self) -> usize {
        match self {
            WeatherVariable::Temperature => 0,
            WeatherVariable::Humidity => 1,
            WeatherVariable::WindSpeed => 2,
            WeatherVariable::SolarRadiation => 3,
            WeatherVariable::Pressure => 4,
            WeatherVariable::Precipitation => 5,
        }
    }
}

impl fmt::Display for WeatherVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectedReading {
    #[error("{variable} reading {value} is outside the variable's valid range")]
    OutOfRange { variable: WeatherVariable, value: f64 },
    #[error("rain counter jumped {delta:.1}mm in one event (max {MAX_RAIN_DELTA_MM}mm)")]
    RainDeltaTooLarge { delta: f64 },
}

/// Check a single raw reading against its variable's fixed range.
/// Non-finite values are always rejected.
pub fn validate(variable: WeatherVariable, value: f64) -> Result<(), RejectedReading> {
    if value.is_finite() && variable.valid_range().contains(&value) {
        Ok(())
    } else {
        Err(RejectedReading::OutOfRange { variable, value })
    }
}

// ---------------------------------------------------------------------------
// Daily means
// ---------------------------------------------------------------------------

/// One day's aggregated weather, handed to the ET engine at rollover.
/// Absent fields mean no sample was retained and no last-known value exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyMeans {
    pub temperature_c: Option<f64>,
    pub temperature_min_c: Option<f64>,
    pub temperature_max_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub solar_radiation_wm2: Option<f64>,
    pub pressure_hpa: Option<f64>,
    /// Retained temperature samples, for logging how much data backed the
    /// computation.
    pub sample_count: usize,
}

// ---------------------------------------------------------------------------
// Observation store
// ---------------------------------------------------------------------------

/// In-memory accumulator for the current day's accepted readings
/// (observation mode A), also reused to re-validate and aggregate a window
/// fetched from an external time-series store (mode B).
#[derive(Debug, Default)]
pub struct ObservationStore {
    samples: [Vec<f64>; 6],
    last_value: [Option<f64>; 6],
    last_precip_total: Option<f64>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an instantaneous reading (every variable except the cumulative
    /// precipitation counter, which goes through [`record_precipitation`]).
    ///
    /// [`record_precipitation`]: ObservationStore::record_precipitation
    pub fn record(&mut self, variable: WeatherVariable, value: f64) -> Result<(), RejectedReading> {
        validate(variable, value)?;
        let i = variable.index();
        self.samples[i].push(value);
        self.last_value[i] = Some(value);
        Ok(())
    }

    /// Record a cumulative precipitation total and return the positive rain
    /// delta since the previous total, if any.
    ///
    /// The first reading only establishes the baseline. A shrinking counter
    /// is a sensor reset, not negative rain, and yields `None`. A jump
    /// larger than [`MAX_RAIN_DELTA_MM`] is rejected as a glitch; the new
    /// total still becomes the baseline so the glitch is never credited.
    pub fn record_precipitation(&mut self, total: f64) -> Result<Option<f64>, RejectedReading> {
        validate(WeatherVariable::Precipitation, total)?;
        let prev = self.last_precip_total.replace(total);
        self.last_value[WeatherVariable::Precipitation.index()] = Some(total);
        let delta = match prev {
            Some(p) => total - p,
            None => return Ok(None),
        };
        if delta > MAX_RAIN_DELTA_MM {
            return Err(RejectedReading::RainDeltaTooLarge { delta });
        }
        if delta > 0.0 {
            Ok(Some(delta))
        } else {
            if delta < 0.0 {
                debug!(total, "rain counter decreased — treating as counter reset");
            }
            Ok(None)
        }
    }

    /// Arithmetic mean of the retained samples for the current window, the
    /// last known instantaneous value if nothing was retained, or absent.
    pub fn daily_mean(&self, variable: WeatherVariable) -> Option<f64> {
        let i = variable.index();
        let samples = &self.samples[i];
        if samples.is_empty() {
            self.last_value[i]
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        }
    }

    pub fn sample_count(&self, variable: WeatherVariable) -> usize {
        self.samples[variable.index()].len()
    }

    /// Minimum and maximum retained temperature samples, feeding the
    /// diurnal-range term of the temperature-only ET formula.
    pub fn temperature_extremes(&self) -> Option<(f64, f64)> {
        let samples = &self.samples[WeatherVariable::Temperature.index()];
        let first = *samples.first()?;
        let (min, max) = samples
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some((min, max))
    }

    /// Snapshot the whole aggregate for the ET engine.
    pub fn daily_means(&self) -> DailyMeans {
        let (tmin, tmax) = match self.temperature_extremes() {
            Some((lo, hi)) => (Some(lo), Some(hi)),
            None => (None, None),
        };
        DailyMeans {
            temperature_c: self.daily_mean(WeatherVariable::Temperature),
            temperature_min_c: tmin,
            temperature_max_c: tmax,
            humidity_pct: self.daily_mean(WeatherVariable::Humidity),
            wind_speed_kmh: self.daily_mean(WeatherVariable::WindSpeed),
            solar_radiation_wm2: self.daily_mean(WeatherVariable::SolarRadiation),
            pressure_hpa: self.daily_mean(WeatherVariable::Pressure),
            sample_count: self.sample_count(WeatherVariable::Temperature),
        }
    }

    /// Discard all retained samples for the day. Last-known values and the
    /// precipitation baseline survive so the next day starts informed.
    pub fn reset_day(&mut self) {
        for samples in &mut self.samples {
            samples.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Mode B aggregation
// ---------------------------------------------------------------------------

/// Aggregate a day's worth of points fetched from an external time-series
/// store, applying the same per-reading validation as live accumulation.
/// State may have advanced while the query was outstanding, so every point
/// is re-validated on arrival.
pub fn means_from_history(rows: &[(WeatherVariable, f64)]) -> DailyMeans {
    let mut store = ObservationStore::new();
    let mut rejected = 0usize;
    for &(variable, value) in rows {
        let accepted = match variable {
            WeatherVariable::Precipitation => store.record_precipitation(value).is_ok(),
            _ => store.record(variable, value).is_ok(),
        };
        if !accepted {
            rejected += 1;
        }
    }
    if rejected > 0 {
        warn!(rejected, total = rows.len(), "discarded invalid points from history window");
    }
    store.daily_means()
}

// ===========================================================================
// Tests
// ===========================================================================
