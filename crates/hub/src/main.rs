mod config;
mod history;
mod mqtt;
mod runner;
mod sink;
mod state;
mod web;

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{collections::HashMap, env, sync::Arc, time::Duration};
use tokio::sync::{mpsc, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use adaptive_irrigation_engine::{Controller, ControllerConfig, WeatherVariable};

use history::History;
use runner::{InputEvent, Runner};
use sink::Sinks;
use state::{EventKind, SharedState, SystemState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let db_url =
        env::var("DB_URL").unwrap_or_else(|_| "sqlite:irrigation-history.db?mode=rwc".to_string());
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

    // ── Config file ─────────────────────────────────────────────────
    let cfg = config::load(&config_path)?;
    if cfg.zones.is_empty() {
        warn!("no zones configured — nothing will be scheduled");
    }

    // ── History store ───────────────────────────────────────────────
    let history = History::connect(&db_url).await?;
    history.init_schema().await?;

    // ── Engine controller ───────────────────────────────────────────
    let controller = Controller::new(ControllerConfig {
        location: cfg.location(),
        channels: cfg.channels(),
        zones: cfg.engine_zones(),
    })?;

    info!(
        zones = cfg.zones.len(),
        method = %controller.method(),
        source = ?cfg.weather.source,
        "configuration loaded"
    );

    // ── Shared state (ephemeral, for the status endpoint) ───────────
    let shared: SharedState = Arc::new(RwLock::new(SystemState::new(&cfg.zone_names())));
    {
        let mut st = shared.write().await;
        st.record_event(EventKind::System, "hub started".to_string());
    }

    // ── Web server ──────────────────────────────────────────────────
    let web_state = Arc::clone(&shared);
    tokio::spawn(async move {
        web::serve(web_state).await;
    });

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new("adaptive-irrigation-hub", broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    let weather_topics: HashMap<String, WeatherVariable> =
        cfg.weather_topic_map().into_iter().collect();
    let sprinkler_topics: HashMap<String, String> = cfg.sprinkler_topic_map().into_iter().collect();
    let forecast_topic = cfg.weather.forecast_rain_topic.clone();

    for topic in weather_topics.keys() {
        client.subscribe(topic.as_str(), QoS::AtLeastOnce).await?;
    }
    for topic in sprinkler_topics.keys() {
        client.subscribe(topic.as_str(), QoS::AtLeastOnce).await?;
    }
    if let Some(topic) = &forecast_topic {
        client.subscribe(topic.as_str(), QoS::AtLeastOnce).await?;
    }
    client.subscribe(mqtt::BALANCE_SET_PATTERN, QoS::AtLeastOnce).await?;
    client.subscribe(mqtt::ET_RUN_TOPIC, QoS::AtLeastOnce).await?;

    // ── Controller task ─────────────────────────────────────────────
    let (tx, rx) = mpsc::channel::<InputEvent>(64);
    let runner = Runner {
        controller,
        source: cfg.weather.source,
        history: history.clone(),
        sinks: Sinks {
            shared: Arc::clone(&shared),
            mqtt: client.clone(),
        },
        rollover_at: cfg.rollover_time()?,
        reevaluate_every: Duration::from_secs(cfg.daily.reevaluate_interval_sec),
    };
    tokio::spawn(runner.run(rx));

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let topic = p.topic.as_str();
                if let Some(&variable) = weather_topics.get(topic) {
                    match mqtt::parse_sensor_value(&p.payload) {
                        Ok(value) => {
                            let _ = tx.send(InputEvent::Weather { variable, value }).await;
                        }
                        Err(msg) => {
                            warn!(topic, "{msg}");
                            let mut st = shared.write().await;
                            st.record_event(EventKind::Error, msg);
                        }
                    }
                } else if let Some(zone_id) = sprinkler_topics.get(topic) {
                    match mqtt::parse_switch_state(&p.payload) {
                        Ok(on) => {
                            let _ = tx
                                .send(InputEvent::Sprinkler {
                                    zone_id: zone_id.clone(),
                                    on,
                                })
                                .await;
                        }
                        Err(msg) => {
                            warn!(topic, "{msg} (use ON/OFF)");
                            let mut st = shared.write().await;
                            st.record_event(EventKind::Error, msg);
                        }
                    }
                } else if forecast_topic.as_deref() == Some(topic) {
                    match mqtt::parse_sensor_value(&p.payload) {
                        Ok(value) => {
                            let _ = tx.send(InputEvent::ForecastRain { value }).await;
                        }
                        Err(msg) => warn!(topic, "{msg}"),
                    }
                } else if topic == mqtt::ET_RUN_TOPIC {
                    let _ = tx.send(InputEvent::RunEtNow).await;
                } else if let Some(zone_id) = mqtt::extract_balance_zone(topic) {
                    match mqtt::parse_sensor_value(&p.payload) {
                        Ok(value) => {
                            let _ = tx
                                .send(InputEvent::SetBalance {
                                    zone_id: zone_id.to_string(),
                                    value,
                                })
                                .await;
                        }
                        Err(msg) => warn!(topic, "{msg}"),
                    }
                } else {
                    debug!(topic, "unhandled topic");
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                let mut st = shared.write().await;
                st.mqtt_connected = true;
                st.record_event(EventKind::System, "mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_event(EventKind::System, "mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                error!("mqtt error: {e}. reconnecting...");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_event(EventKind::Error, format!("mqtt error: {e}"));
                drop(st);

                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
