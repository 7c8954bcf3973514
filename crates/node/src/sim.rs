//! Stateful weather station simulator for local development.
//!
//! Produces plausible correlated readings for every channel the hub
//! understands:
//! - Diurnal temperature curve with random walk on the daily baseline
//! - Humidity inversely coupled to temperature
//! - Mean-reverting wind
//! - Daylight-shaped solar radiation scaled by slow-moving cloud cover
//! - Slowly drifting barometric pressure
//! - A cumulative rain counter with shower episodes and occasional counter
//!   resets (the reset exercises the hub's negative-delta guard)

use std::fmt;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Hot, dry, cloudless. The balance should drain steadily with no rain
    /// events; good for watching the scheduler reach "ready to run".
    Heatwave,
    /// Mild with scattered showers. Exercises the rain-delta path.
    Showery,
    /// Heavy rain, heavy cloud. The forecast and rainfall should keep
    /// zones from ever running.
    Stormy,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "showery" => Self::Showery,
            "stormy" => Self::Stormy,
            _ => Self::Heatwave, // default
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heatwave => write!(f, "heatwave"),
            Self::Showery => write!(f, "showery"),
            Self::Stormy => write!(f, "stormy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One sampling instant across all channels. Values stay inside the hub's
/// validation ranges by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherFrame {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_kmh: f64,
    pub solar_wm2: f64,
    pub pressure_hpa: f64,
    /// Cumulative counter, mm.
    pub rain_total_mm: f64,
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct WeatherSim {
    // Daily shape
    temp_base: f64,
    temp_amplitude: f64,
    humidity_base: f64,
    solar_peak_wm2: f64,
    /// Day/night cycle length in seconds. Use 600 for fast dev iteration or
    /// 86400 for real time.
    day_period_s: f64,

    // Evolving state
    wind_kmh: f64,
    pressure_hpa: f64,
    cloud_cover: f64, // 0.0 clear .. 1.0 overcast
    rain_total_mm: f64,

    // Rain behaviour
    shower_prob: f64,
    shower_mm: f64,
    reset_prob: f64,
}

impl WeatherSim {
    pub fn new(scenario: Scenario, day_period_s: f64) -> Self {
        let (temp_base, temp_amplitude, humidity_base, cloud, shower_prob, shower_mm) =
            match scenario {
                Scenario::Heatwave => (28.0, 7.0, 35.0, 0.05, 0.0, 0.0),
                Scenario::Showery => (18.0, 5.0, 65.0, 0.4, 0.03, 1.5),
                Scenario::Stormy => (14.0, 3.0, 85.0, 0.85, 0.15, 4.0),
            };
        Self {
            temp_base,
            temp_amplitude,
            humidity_base,
            solar_peak_wm2: 900.0,
            day_period_s,
            wind_kmh: 8.0,
            pressure_hpa: 1013.0,
            cloud_cover: cloud,
            rain_total_mm: 0.0,
            shower_prob,
            shower_mm,
            reset_prob: 0.001,
        }
    }

    /// Produce the next frame for elapsed time `t_secs` since start.
    pub fn sample(&mut self, t_secs: f64) -> WeatherFrame {
        // Phase 0.0 = midnight, 0.5 = noon.
        let phase = (t_secs / self.day_period_s).fract();
        let diurnal = (2.0 * std::f64::consts::PI * (phase - 0.25)).sin();

        let temperature = gaussian(self.temp_base + self.temp_amplitude * diurnal, 0.4)
            .clamp(-45.0, 55.0);
        let humidity = gaussian(self.humidity_base - 15.0 * diurnal, 2.0).clamp(5.0, 100.0);

        // Mean-reverting wind, never negative.
        self.wind_kmh = (self.wind_kmh + gaussian(0.0, 1.0) + (8.0 - self.wind_kmh) * 0.05)
            .clamp(0.0, 120.0);

        // Cloud cover moves slowly; solar follows the daylight half-sine.
        self.cloud_cover = (self.cloud_cover + gaussian(0.0, 0.02)).clamp(0.0, 1.0);
        let daylight = (std::f64::consts::PI * (phase - 0.25) * 2.0).sin().max(0.0);
        let solar = (self.solar_peak_wm2 * daylight * (1.0 - 0.75 * self.cloud_cover))
            .clamp(0.0, 1400.0);

        self.pressure_hpa =
            (self.pressure_hpa + gaussian(0.0, 0.3) + (1013.0 - self.pressure_hpa) * 0.01)
                .clamp(960.0, 1060.0);

        // Rain: shower episodes bump the cumulative counter; a rare reset
        // drops it back to zero like a real tipping-bucket rollover.
        if fastrand::f64() < self.reset_prob && self.rain_total_mm > 0.0 {
            self.rain_total_mm = 0.0;
        } else if fastrand::f64() < self.shower_prob {
            self.rain_total_mm += gaussian(self.shower_mm, self.shower_mm * 0.3).abs();
        }
        if self.rain_total_mm > 450.0 {
            self.rain_total_mm = 0.0; // keep the counter inside its range
        }

        WeatherFrame {
            temperature_c: temperature,
            humidity_pct: humidity,
            wind_kmh: self.wind_kmh,
            solar_wm2: solar,
            pressure_hpa: self.pressure_hpa,
            rain_total_mm: self.rain_total_mm,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
