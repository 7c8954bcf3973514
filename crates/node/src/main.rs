//! Simulated weather station: publishes plausible readings to the hub's
//! weather topics so the whole pipeline can run without hardware.

mod sim;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, time::Duration};
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sim::{Scenario, WeatherFrame, WeatherSim};

/// (topic suffix, value) pairs for one frame.
fn frame_readings(frame: &WeatherFrame) -> [(&'static str, f64); 6] {
    [
        ("temperature", frame.temperature_c),
        ("humidity", frame.humidity_pct),
        ("wind_speed", frame.wind_kmh),
        ("solar_radiation", frame.solar_wm2),
        ("pressure", frame.pressure_hpa),
        ("precipitation", frame.rain_total_mm),
    ]
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Env config
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let prefix = env::var("TOPIC_PREFIX").unwrap_or_else(|_| "weather".to_string());
    let sample_every_s: u64 = env::var("SAMPLE_EVERY_S")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);
    let day_period_s: f64 = env::var("DAY_PERIOD_S")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(86_400.0);
    let scenario = Scenario::from_str_lossy(
        &env::var("SIM_SCENARIO").unwrap_or_else(|_| "heatwave".to_string()),
    );

    let mut mqttoptions = MqttOptions::new("adaptive-irrigation-node", broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    // Publish-only node, but the event loop must run to keep the
    // connection alive.
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("node connected to mqtt");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("mqtt error: {e}. retrying...");
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    info!(%scenario, %prefix, sample_every_s, day_period_s, "weather simulator started");

    let mut sim = WeatherSim::new(scenario, day_period_s);
    let mut elapsed: f64 = 0.0;

    loop {
        let frame = sim.sample(elapsed);
        for (suffix, value) in frame_readings(&frame) {
            let topic = format!("{prefix}/{suffix}");
            let payload = format!("{value:.2}").into_bytes();
            if let Err(e) = client.publish(&topic, QoS::AtLeastOnce, false, payload).await {
                error!("publish error on {topic}: {e}");
            }
        }
        info!(
            t = format!("{:.1}", frame.temperature_c),
            rh = format!("{:.0}", frame.humidity_pct),
            rain = format!("{:.1}", frame.rain_total_mm),
            "published frame"
        );

        sleep(Duration::from_secs(sample_every_s)).await;
        elapsed += sample_every_s as f64;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
