//! Ephemeral shared state backing the HTTP status endpoint: the latest
//! per-zone snapshots, yesterday's reference ET, and a ring buffer of
//! recent events.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use adaptive_irrigation_engine::ZoneUpdate;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    pub yesterday_et0_mm: Option<f64>,
    pub zones: BTreeMap<String, ZoneStatus>,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize, Default)]
pub struct ZoneStatus {
    pub name: String,
    /// Reported at 0.1 mm precision.
    pub balance_mm: f64,
    pub effective_deficit_mm: f64,
    pub required_runtime_seconds: f64,
    pub clamped_runtime_seconds: f64,
    pub forecast_rain_mm: f64,
    pub can_run: bool,
    pub reason: String,
    pub runtime_today_seconds: f64,
    pub last_et_mm: f64,
    pub last_rainfall_mm: f64,
    pub sprinkler_on: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_changed: Option<OffsetDateTime>,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Rainfall,
    Sprinkler,
    Rollover,
    Override,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub yesterday_et0_mm: Option<f64>,
    pub zones: BTreeMap<String, ZoneStatus>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl SystemState {
    pub fn new(zone_names: &[(String, String)]) -> Self {
        let mut zones = BTreeMap::new();
        for (zone_id, name) in zone_names {
            zones.insert(
                zone_id.clone(),
                ZoneStatus {
                    name: name.clone(),
                    ..Default::default()
                },
            );
        }
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            yesterday_et0_mm: None,
            zones,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Absorb a freshly computed zone snapshot.
    pub fn record_zone_update(&mut self, update: &ZoneUpdate) {
        let Some(zone) = self.zones.get_mut(&update.zone_id) else {
            return;
        };
        zone.balance_mm = round1(update.balance_mm);
        zone.effective_deficit_mm = update.snapshot.effective_deficit_mm;
        zone.required_runtime_seconds = update.snapshot.required_runtime_seconds;
        zone.clamped_runtime_seconds = update.snapshot.clamped_runtime_seconds;
        zone.forecast_rain_mm = update.snapshot.forecast_rain_mm;
        zone.can_run = update.snapshot.can_run;
        zone.reason = update.snapshot.reason.to_string();
        zone.runtime_today_seconds = update.runtime_today_seconds;
        zone.last_et_mm = update.last_et_mm;
        zone.last_rainfall_mm = update.last_rainfall_mm;
    }

    /// Record an observed sprinkler transition.
    pub fn record_sprinkler(&mut self, zone_id: &str, on: bool) {
        if let Some(zone) = self.zones.get_mut(zone_id) {
            zone.sprinkler_on = on;
            zone.last_changed = Some(OffsetDateTime::now_utc());
        }
        let state_str = if on { "ON" } else { "OFF" };
        self.push_event(EventKind::Sprinkler, format!("{zone_id} turned {state_str}"));
    }

    /// Record a completed daily rollover.
    pub fn record_rollover(&mut self, et0_mm: f64) {
        self.yesterday_et0_mm = Some(et0_mm);
        self.push_event(EventKind::Rollover, format!("reference ET0 {et0_mm:.2}mm applied"));
    }

    pub fn record_event(&mut self, kind: EventKind, detail: String) {
        self.push_event(kind, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            yesterday_et0_mm: self.yesterday_et0_mm,
            zones: self.zones.clone(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
