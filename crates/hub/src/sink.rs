//! The single publish step.
//!
//! Every controller mutation yields typed zone updates; this module pushes
//! them to all interested sinks (the shared status state and the retained
//! MQTT state topics) so no sink ever reaches into another. A failed MQTT
//! publish is logged and dropped; the in-memory state already advanced and
//! the next update republishes everything.

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tracing::error;

use adaptive_irrigation_engine::ZoneUpdate;

use crate::mqtt::{zone_state_topic, ET0_TOPIC};
use crate::state::{round1, SharedState};

/// The per-zone state document published over MQTT.
#[derive(Serialize)]
struct ZoneStateDoc<'a> {
    zone_id: &'a str,
    balance_mm: f64,
    effective_deficit_mm: f64,
    required_runtime_seconds: f64,
    clamped_runtime_seconds: f64,
    forecast_rain_mm: f64,
    can_run: bool,
    reason: String,
    runtime_today_seconds: f64,
}

pub struct Sinks {
    pub shared: SharedState,
    pub mqtt: AsyncClient,
}

impl Sinks {
    pub async fn publish_zone(&self, update: &ZoneUpdate) {
        {
            let mut st = self.shared.write().await;
            st.record_zone_update(update);
        }

        let doc = ZoneStateDoc {
            zone_id: &update.zone_id,
            balance_mm: round1(update.balance_mm),
            effective_deficit_mm: update.snapshot.effective_deficit_mm,
            required_runtime_seconds: update.snapshot.required_runtime_seconds,
            clamped_runtime_seconds: update.snapshot.clamped_runtime_seconds,
            forecast_rain_mm: update.snapshot.forecast_rain_mm,
            can_run: update.snapshot.can_run,
            reason: update.snapshot.reason.to_string(),
            runtime_today_seconds: update.runtime_today_seconds,
        };
        let payload = match serde_json::to_vec(&doc) {
            Ok(p) => p,
            Err(e) => {
                error!(zone = %update.zone_id, "failed to serialise zone state: {e}");
                return;
            }
        };
        if let Err(e) = self
            .mqtt
            .publish(zone_state_topic(&update.zone_id), QoS::AtLeastOnce, true, payload)
            .await
        {
            error!(zone = %update.zone_id, "failed to publish zone state: {e}");
        }
    }

    pub async fn publish_all(&self, updates: &[ZoneUpdate]) {
        for update in updates {
            self.publish_zone(update).await;
        }
    }

    /// Push yesterday's reference ET0 after a completed rollover.
    pub async fn publish_et0(&self, et0_mm: f64) {
        {
            let mut st = self.shared.write().await;
            st.record_rollover(et0_mm);
        }
        let payload = format!("{et0_mm:.2}").into_bytes();
        if let Err(e) = self.mqtt.publish(ET0_TOPIC, QoS::AtLeastOnce, true, payload).await {
            error!("failed to publish et0: {e}");
        }
    }
}
