//! Controller task: the one logical execution context that owns all mutable
//! core state.
//!
//! MQTT ingress parses packets into [`InputEvent`]s and sends them over an
//! mpsc channel; this task drains the channel and drives the engine
//! controller, interleaved with two timers: the periodic re-evaluation
//! tick and the daily rollover instant. Events that arrive while a mode-B
//! history query is awaited queue in the channel and are applied strictly
//! after the rollover completes.

use std::time::Duration;

use anyhow::Result;
use time::{OffsetDateTime, Time};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use adaptive_irrigation_engine::{
    means_from_history, validate, Controller, SprinklerOutcome, WeatherVariable,
};

use crate::config::ObservationSource;
use crate::history::History;
use crate::sink::Sinks;
use crate::state::EventKind;

/// How long fetched history is kept before pruning, seconds.
const HISTORY_RETENTION_SECS: i64 = 7 * 86_400;

/// External happenings routed into the controller task.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Weather { variable: WeatherVariable, value: f64 },
    Sprinkler { zone_id: String, on: bool },
    ForecastRain { value: f64 },
    SetBalance { zone_id: String, value: f64 },
    RunEtNow,
}

pub struct Runner {
    pub controller: Controller,
    pub source: ObservationSource,
    pub history: History,
    pub sinks: Sinks,
    pub rollover_at: Time,
    pub reevaluate_every: Duration,
}

impl Runner {
    /// Run the controller loop. Intended to be `tokio::spawn`-ed from main;
    /// it ends when the event channel closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<InputEvent>) {
        let mut ticker = tokio::time::interval(self.reevaluate_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            zones = self.controller.zone_ids().len(),
            method = %self.controller.method(),
            source = ?self.source,
            rollover = %self.rollover_at,
            "controller task started"
        );

        // Seed the sinks so they start populated instead of blank.
        let updates = self.controller.evaluate_all(OffsetDateTime::now_utc());
        self.sinks.publish_all(&updates).await;

        loop {
            let until_rollover = duration_until(OffsetDateTime::now_utc(), self.rollover_at);
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.handle(event).await,
                        None => {
                            info!("event channel closed — controller task stopping");
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    // Idempotent re-evaluation: the minimum-interval and
                    // forecast conditions are time-dependent, not
                    // event-driven.
                    let updates = self.controller.evaluate_all(OffsetDateTime::now_utc());
                    self.sinks.publish_all(&updates).await;
                }
                _ = tokio::time::sleep(until_rollover) => {
                    self.rollover().await;
                }
            }
        }
    }

    async fn handle(&mut self, event: InputEvent) {
        let now = OffsetDateTime::now_utc();
        match event {
            InputEvent::Weather { variable, value } => {
                let updates = self.controller.record_weather(variable, value, now);
                // Keep the time-series store populated for mode B; only
                // readings that pass validation are worth keeping.
                if validate(variable, value).is_ok() {
                    if let Err(e) = self
                        .history
                        .insert_reading(now.unix_timestamp(), variable, value)
                        .await
                    {
                        warn!("history insert failed: {e:#}");
                    }
                }
                if let Some(first) = updates.first() {
                    let mut st = self.sinks.shared.write().await;
                    st.record_event(
                        EventKind::Rainfall,
                        format!(
                            "rainfall {:.2}mm credited to {} zone(s)",
                            first.last_rainfall_mm,
                            updates.len()
                        ),
                    );
                }
                self.sinks.publish_all(&updates).await;
            }
            InputEvent::Sprinkler { zone_id, on } => {
                match self.controller.sprinkler_changed(&zone_id, on, now) {
                    SprinklerOutcome::TurnedOn => {
                        let mut st = self.sinks.shared.write().await;
                        st.record_sprinkler(&zone_id, true);
                    }
                    SprinklerOutcome::TurnedOff(update) => {
                        {
                            let mut st = self.sinks.shared.write().await;
                            st.record_sprinkler(&zone_id, false);
                        }
                        self.sinks.publish_zone(&update).await;
                    }
                    SprinklerOutcome::Ignored => {}
                }
            }
            InputEvent::ForecastRain { value } => {
                let updates = self.controller.set_forecast_rain(value, now);
                self.sinks.publish_all(&updates).await;
            }
            InputEvent::SetBalance { zone_id, value } => {
                if let Some(update) = self.controller.override_balance(&zone_id, value, now) {
                    {
                        let mut st = self.sinks.shared.write().await;
                        st.record_event(
                            EventKind::Override,
                            format!("{zone_id}: balance overridden to {value:.1}mm"),
                        );
                    }
                    self.sinks.publish_zone(&update).await;
                }
            }
            InputEvent::RunEtNow => {
                info!("on-demand ET run requested");
                self.rollover().await;
            }
        }
    }

    /// The strict daily sequence: means → ET0 → apply to every zone →
    /// store reset. In mode B the prior day's window is fetched first and
    /// re-validated into means; a failed fetch abandons this run with
    /// balances untouched, retried at the next trigger.
    async fn rollover(&mut self) {
        let now = OffsetDateTime::now_utc();
        let result = match self.source {
            ObservationSource::Live => self.controller.daily_rollover(now),
            ObservationSource::History => {
                let end = now.unix_timestamp();
                match self.fetch_window(end - 86_400, end).await {
                    Ok(rows) => {
                        let means = means_from_history(&rows);
                        self.controller.daily_rollover_with(means, now)
                    }
                    Err(e) => {
                        error!("history window query failed — abandoning this rollover: {e:#}");
                        let mut st = self.sinks.shared.write().await;
                        st.record_event(
                            EventKind::Error,
                            format!("rollover abandoned: history unavailable ({e:#})"),
                        );
                        return;
                    }
                }
            }
        };

        match result {
            Ok(report) => {
                info!(
                    et0_mm = format!("{:.2}", report.et0_mm),
                    method = %report.method,
                    downgraded = report.downgraded,
                    "daily rollover applied"
                );
                self.sinks.publish_et0(report.et0_mm).await;
                self.sinks.publish_all(&report.updates).await;

                if let Err(e) = self
                    .history
                    .prune_before(now.unix_timestamp() - HISTORY_RETENTION_SECS)
                    .await
                {
                    warn!("history prune failed: {e:#}");
                }
            }
            Err(e) => {
                warn!("ET application skipped for this rollover: {e}");
                let mut st = self.sinks.shared.write().await;
                st.record_event(EventKind::Error, format!("ET skipped: {e}"));
            }
        }
    }

    async fn fetch_window(&self, start: i64, end: i64) -> Result<Vec<(WeatherVariable, f64)>> {
        let mut rows = Vec::new();
        for variable in WeatherVariable::ALL {
            for (_, value) in self.history.window(variable, start, end).await? {
                rows.push((variable, value));
            }
        }
        Ok(rows)
    }
}

/// Time until the next occurrence of `at` on the UTC wall clock.
pub(crate) fn duration_until(now: OffsetDateTime, at: Time) -> Duration {
    let mut next = now.replace_time(at);
    if next <= now {
        next += time::Duration::days(1);
    }
    Duration::try_from(next - now).unwrap_or(Duration::from_secs(60))
}

// ===========================================================================
// Tests
// ===========================================================================
