//! TOML config file loading and validation for the hub: location, weather
//! sensor topics, observation source, timers, and zones.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use time::Time;

use adaptive_irrigation_engine::{
    validate_zones, Location, WeatherChannels, WeatherVariable, ZoneConfig,
};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    pub location: LocationSection,
    pub weather: WeatherSection,
    #[serde(default)]
    pub daily: DailySection,
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
}

#[derive(Debug, Deserialize)]
pub struct LocationSection {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: f64,
}

#[derive(Debug, Deserialize)]
pub struct WeatherSection {
    pub temperature_topic: String,
    pub humidity_topic: String,
    pub precipitation_topic: String,
    pub wind_speed_topic: Option<String>,
    pub solar_radiation_topic: Option<String>,
    pub pressure_topic: Option<String>,
    pub forecast_rain_topic: Option<String>,
    /// Where daily means come from: live in-memory accumulation, or a
    /// prior-day window query against the history store at rollover.
    /// Exactly one mode is active per process.
    #[serde(default)]
    pub source: ObservationSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationSource {
    #[default]
    Live,
    History,
}

#[derive(Debug, Deserialize)]
pub struct DailySection {
    /// UTC wall-clock instant of the daily rollover, "HH:MM".
    #[serde(default = "default_rollover")]
    pub rollover: String,
    /// Period of the idempotent re-evaluation tick, seconds.
    #[serde(default = "default_reevaluate_interval")]
    pub reevaluate_interval_sec: u64,
}

impl Default for DailySection {
    fn default() -> Self {
        Self {
            rollover: default_rollover(),
            reevaluate_interval_sec: default_reevaluate_interval(),
        }
    }
}

fn default_rollover() -> String {
    "00:00".to_string()
}

fn default_reevaluate_interval() -> u64 {
    60
}

#[derive(Debug, Deserialize)]
pub struct ZoneEntry {
    pub zone_id: String,
    pub name: String,
    /// MQTT topic carrying the zone's sprinkler ON/OFF state.
    pub sprinkler_topic: String,
    #[serde(default = "default_precipitation_rate")]
    pub precipitation_rate: f64,
    #[serde(default = "default_crop_coefficient")]
    pub crop_coefficient: f64,
    #[serde(default = "default_min_runtime")]
    pub min_runtime: f64,
    #[serde(default = "default_max_runtime")]
    pub max_runtime: f64,
    #[serde(default = "default_minimum_interval")]
    pub minimum_interval: f64,
    #[serde(default = "default_max_balance")]
    pub max_balance: f64,
    #[serde(default = "default_min_balance")]
    pub min_balance: f64,
}

fn default_precipitation_rate() -> f64 {
    10.0
}
fn default_crop_coefficient() -> f64 {
    1.0
}
fn default_min_runtime() -> f64 {
    60.0
}
fn default_max_runtime() -> f64 {
    3600.0
}
fn default_minimum_interval() -> f64 {
    3600.0
}
fn default_max_balance() -> f64 {
    5.0
}
fn default_min_balance() -> f64 {
    -20.0
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_location(&mut errors);
        self.validate_weather(&mut errors);
        self.validate_daily(&mut errors);
        self.validate_zone_topics(&mut errors);

        // Numeric zone constraints live in the engine so any embedder gets
        // the same checks.
        if let Err(e) = validate_zones(&self.engine_zones()) {
            errors.extend(e.0);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_location(&self, errors: &mut Vec<String>) {
        let loc = &self.location;
        if !(-90.0..=90.0).contains(&loc.latitude) {
            errors.push(format!("location: latitude {} out of range [-90, 90]", loc.latitude));
        }
        if !(-180.0..=180.0).contains(&loc.longitude) {
            errors.push(format!(
                "location: longitude {} out of range [-180, 180]",
                loc.longitude
            ));
        }
        if !(-430.0..=9000.0).contains(&loc.elevation) {
            errors.push(format!(
                "location: elevation {} out of range [-430, 9000] metres",
                loc.elevation
            ));
        }
    }

    fn validate_weather(&self, errors: &mut Vec<String>) {
        let w = &self.weather;
        let required = [
            ("temperature_topic", &w.temperature_topic),
            ("humidity_topic", &w.humidity_topic),
            ("precipitation_topic", &w.precipitation_topic),
        ];
        for (field, topic) in required {
            if topic.trim().is_empty() {
                errors.push(format!("weather: {field} is empty"));
            }
        }
        let optional = [
            ("wind_speed_topic", &w.wind_speed_topic),
            ("solar_radiation_topic", &w.solar_radiation_topic),
            ("pressure_topic", &w.pressure_topic),
            ("forecast_rain_topic", &w.forecast_rain_topic),
        ];
        for (field, topic) in optional {
            if matches!(topic, Some(t) if t.trim().is_empty()) {
                errors.push(format!("weather: {field} is empty (omit it instead)"));
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (topic, _) in self.weather_topic_map_refs() {
            if !topic.is_empty() && !seen.insert(topic) {
                errors.push(format!("weather: topic '{topic}' is used by more than one variable"));
            }
        }
    }

    fn validate_daily(&self, errors: &mut Vec<String>) {
        if parse_rollover(&self.daily.rollover).is_none() {
            errors.push(format!(
                "daily: rollover '{}' is not a valid HH:MM time",
                self.daily.rollover
            ));
        }
        if self.daily.reevaluate_interval_sec == 0 {
            errors.push("daily: reevaluate_interval_sec must be positive".to_string());
        }
    }

    fn validate_zone_topics(&self, errors: &mut Vec<String>) {
        let weather_topics: HashSet<&str> =
            self.weather_topic_map_refs().into_iter().map(|(t, _)| t).collect();
        let mut seen: HashSet<&str> = HashSet::new();

        for (i, z) in self.zones.iter().enumerate() {
            let ctx = || {
                if z.zone_id.is_empty() {
                    format!("zones[{i}]")
                } else {
                    format!("zone '{}'", z.zone_id)
                }
            };
            if z.sprinkler_topic.trim().is_empty() {
                errors.push(format!("{}: sprinkler_topic is empty", ctx()));
            } else if !seen.insert(&z.sprinkler_topic) {
                errors.push(format!(
                    "{}: sprinkler_topic '{}' is already used by another zone",
                    ctx(),
                    z.sprinkler_topic
                ));
            } else if weather_topics.contains(z.sprinkler_topic.as_str()) {
                errors.push(format!(
                    "{}: sprinkler_topic '{}' collides with a weather topic",
                    ctx(),
                    z.sprinkler_topic
                ));
            }
        }
    }

    // -- conversions into engine types ---------------------------------------

    pub fn engine_zones(&self) -> Vec<ZoneConfig> {
        self.zones
            .iter()
            .map(|z| ZoneConfig {
                zone_id: z.zone_id.clone(),
                name: z.name.clone(),
                precipitation_rate: z.precipitation_rate,
                crop_coefficient: z.crop_coefficient,
                min_runtime: z.min_runtime,
                max_runtime: z.max_runtime,
                minimum_interval: z.minimum_interval,
                max_balance: z.max_balance,
                min_balance: z.min_balance,
            })
            .collect()
    }

    pub fn location(&self) -> Location {
        Location {
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            elevation: self.location.elevation,
        }
    }

    /// Which optional channels exist, driving ET method selection.
    pub fn channels(&self) -> WeatherChannels {
        WeatherChannels {
            wind_speed: self.weather.wind_speed_topic.is_some(),
            solar_radiation: self.weather.solar_radiation_topic.is_some(),
            pressure: self.weather.pressure_topic.is_some(),
            forecast_rain: self.weather.forecast_rain_topic.is_some(),
        }
    }

    /// Topic → variable routing table for the MQTT loop.
    pub fn weather_topic_map(&self) -> Vec<(String, WeatherVariable)> {
        self.weather_topic_map_refs()
            .into_iter()
            .map(|(t, v)| (t.to_string(), v))
            .collect()
    }

    fn weather_topic_map_refs(&self) -> Vec<(&str, WeatherVariable)> {
        let w = &self.weather;
        let mut map = vec![
            (w.temperature_topic.as_str(), WeatherVariable::Temperature),
            (w.humidity_topic.as_str(), WeatherVariable::Humidity),
            (w.precipitation_topic.as_str(), WeatherVariable::Precipitation),
        ];
        if let Some(t) = &w.wind_speed_topic {
            map.push((t.as_str(), WeatherVariable::WindSpeed));
        }
        if let Some(t) = &w.solar_radiation_topic {
            map.push((t.as_str(), WeatherVariable::SolarRadiation));
        }
        if let Some(t) = &w.pressure_topic {
            map.push((t.as_str(), WeatherVariable::Pressure));
        }
        map
    }

    /// Topic → zone_id routing table for sprinkler state messages.
    pub fn sprinkler_topic_map(&self) -> Vec<(String, String)> {
        self.zones
            .iter()
            .map(|z| (z.sprinkler_topic.clone(), z.zone_id.clone()))
            .collect()
    }

    /// (zone_id, name) pairs for seeding the shared status state.
    pub fn zone_names(&self) -> Vec<(String, String)> {
        self.zones
            .iter()
            .map(|z| (z.zone_id.clone(), z.name.clone()))
            .collect()
    }

    pub fn rollover_time(&self) -> Result<Time> {
        parse_rollover(&self.daily.rollover)
            .with_context(|| format!("invalid rollover time '{}'", self.daily.rollover))
    }
}

/// Parse "HH:MM" into a UTC wall-clock time.
fn parse_rollover(s: &str) -> Option<Time> {
    let (h, m) = s.split_once(':')?;
    let hour: u8 = h.parse().ok()?;
    let minute: u8 = m.parse().ok()?;
    Time::from_hms(hour, minute, 0).ok()
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[location]
latitude = 45.1
longitude = 7.6
elevation = 240.0

[weather]
temperature_topic = "weather/temperature"
humidity_topic = "weather/humidity"
precipitation_topic = "weather/precipitation"

[[zones]]
zone_id = "lawn"
name = "Front Lawn"
sprinkler_topic = "sprinkler/lawn/state"
"#;

    fn valid_config() -> Config {
        toml::from_str(MINIMAL_TOML).unwrap()
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- parsing -----------------------------------------------------------

    #[test]
    fn parse_minimal_config_applies_defaults() {
        let cfg = valid_config();
        assert_eq!(cfg.weather.source, ObservationSource::Live);
        assert_eq!(cfg.daily.rollover, "00:00");
        assert_eq!(cfg.daily.reevaluate_interval_sec, 60);
        let z = &cfg.zones[0];
        assert_eq!(z.precipitation_rate, 10.0);
        assert_eq!(z.crop_coefficient, 1.0);
        assert_eq!(z.min_runtime, 60.0);
        assert_eq!(z.max_runtime, 3600.0);
        assert_eq!(z.minimum_interval, 3600.0);
        assert_eq!(z.max_balance, 5.0);
        assert_eq!(z.min_balance, -20.0);
    }

    #[test]
    fn parse_history_source() {
        let toml_str = MINIMAL_TOML.replace(
            "precipitation_topic = \"weather/precipitation\"",
            "precipitation_topic = \"weather/precipitation\"\nsource = \"history\"",
        );
        let cfg: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(cfg.weather.source, ObservationSource::History);
    }

    #[test]
    fn missing_required_topic_fails_parse() {
        let toml_str = MINIMAL_TOML.replace("humidity_topic = \"weather/humidity\"\n", "");
        assert!(toml::from_str::<Config>(&toml_str).is_err());
    }

    // -- validation --------------------------------------------------------

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn latitude_out_of_range_rejected() {
        let mut cfg = valid_config();
        cfg.location.latitude = 91.0;
        assert_validation_err(&cfg, "latitude");
    }

    #[test]
    fn empty_required_topic_rejected() {
        let mut cfg = valid_config();
        cfg.weather.temperature_topic = " ".into();
        assert_validation_err(&cfg, "temperature_topic is empty");
    }

    #[test]
    fn empty_optional_topic_rejected() {
        let mut cfg = valid_config();
        cfg.weather.wind_speed_topic = Some("".into());
        assert_validation_err(&cfg, "wind_speed_topic is empty");
    }

    #[test]
    fn duplicate_weather_topic_rejected() {
        let mut cfg = valid_config();
        cfg.weather.humidity_topic = cfg.weather.temperature_topic.clone();
        assert_validation_err(&cfg, "used by more than one variable");
    }

    #[test]
    fn bad_rollover_time_rejected() {
        let mut cfg = valid_config();
        cfg.daily.rollover = "25:00".into();
        assert_validation_err(&cfg, "not a valid HH:MM time");

        let mut cfg = valid_config();
        cfg.daily.rollover = "midnight".into();
        assert_validation_err(&cfg, "not a valid HH:MM time");
    }

    #[test]
    fn zero_reevaluate_interval_rejected() {
        let mut cfg = valid_config();
        cfg.daily.reevaluate_interval_sec = 0;
        assert_validation_err(&cfg, "reevaluate_interval_sec must be positive");
    }

    #[test]
    fn empty_sprinkler_topic_rejected() {
        let mut cfg = valid_config();
        cfg.zones[0].sprinkler_topic = "".into();
        assert_validation_err(&cfg, "sprinkler_topic is empty");
    }

    #[test]
    fn duplicate_sprinkler_topic_rejected() {
        let mut cfg = valid_config();
        let mut second = toml::from_str::<Config>(MINIMAL_TOML).unwrap().zones.remove(0);
        second.zone_id = "beds".into();
        cfg.zones.push(second);
        assert_validation_err(&cfg, "already used by another zone");
    }

    #[test]
    fn sprinkler_topic_colliding_with_weather_rejected() {
        let mut cfg = valid_config();
        cfg.zones[0].sprinkler_topic = "weather/temperature".into();
        assert_validation_err(&cfg, "collides with a weather topic");
    }

    #[test]
    fn engine_zone_violations_are_merged() {
        let mut cfg = valid_config();
        cfg.zones[0].precipitation_rate = 0.0;
        assert_validation_err(&cfg, "precipitation_rate must be positive");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = valid_config();
        cfg.location.latitude = 100.0;
        cfg.daily.rollover = "noon".into();
        cfg.zones[0].precipitation_rate = -1.0;
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("latitude"), "missing latitude error in: {msg}");
        assert!(msg.contains("HH:MM"), "missing rollover error in: {msg}");
        assert!(
            msg.contains("precipitation_rate"),
            "missing rate error in: {msg}"
        );
    }

    // -- conversions -------------------------------------------------------

    #[test]
    fn channels_reflect_configured_topics() {
        let mut cfg = valid_config();
        assert_eq!(cfg.channels(), WeatherChannels::default());
        cfg.weather.wind_speed_topic = Some("weather/wind".into());
        cfg.weather.solar_radiation_topic = Some("weather/solar".into());
        let channels = cfg.channels();
        assert!(channels.wind_speed);
        assert!(channels.solar_radiation);
        assert!(!channels.pressure);
    }

    #[test]
    fn weather_topic_map_routes_optional_channels() {
        let mut cfg = valid_config();
        cfg.weather.pressure_topic = Some("weather/pressure".into());
        let map = cfg.weather_topic_map();
        assert!(map.contains(&("weather/pressure".to_string(), WeatherVariable::Pressure)));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn rollover_time_parses() {
        let mut cfg = valid_config();
        cfg.daily.rollover = "03:30".into();
        assert_eq!(cfg.rollover_time().unwrap(), Time::from_hms(3, 30, 0).unwrap());
    }

    #[test]
    fn sprinkler_topic_map_pairs_topics_with_zones() {
        let cfg = valid_config();
        assert_eq!(
            cfg.sprinkler_topic_map(),
            vec![("sprinkler/lawn/state".to_string(), "lawn".to_string())]
        );
    }
}
