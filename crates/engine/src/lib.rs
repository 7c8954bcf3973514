//! Core decision logic for the adaptive irrigation controller.
//!
//! Per zone, a signed soil-moisture balance (mm) is increased by rainfall
//! and sprinkler runtime and decreased once a day by crop-scaled reference
//! evapotranspiration computed from validated weather observations. A pure
//! evaluator turns the balance, the zone's scheduling constraints, and the
//! rain forecast into a run/no-run verdict with a clamped runtime.
//!
//! Everything here is synchronous and I/O-free: callers supply `now`, feed
//! events into the [`Controller`], and push the returned updates to their
//! own sinks. See the `hub` crate for the MQTT/HTTP process built on top.

pub mod config;
pub mod et;
pub mod evaluate;
pub mod ledger;
pub mod pipeline;
pub mod weather;

pub use config::{validate_zones, ConfigError, Location, WeatherChannels, ZoneConfig};
pub use et::{compute_et0, EtError, EtInputs, EtMethod};
pub use evaluate::{evaluate, CalculatedSnapshot, Reason};
pub use ledger::{Ledger, ZoneState};
pub use pipeline::{
    Controller, ControllerConfig, RolloverReport, SprinklerOutcome, ZoneUpdate,
};
pub use weather::{
    means_from_history, validate, DailyMeans, ObservationStore, RejectedReading, WeatherVariable,
    MAX_RAIN_DELTA_MM,
};
