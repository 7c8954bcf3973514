//! MQTT topic and payload helpers.
//!
//! Weather and sprinkler topics come straight from the config file, so the
//! only structured topics are the hub's own command and state topics under
//! the `irrigation/` prefix.

/// Command topic that triggers an on-demand ET run.
pub(crate) const ET_RUN_TOPIC: &str = "irrigation/et/run";

/// Retained topic carrying yesterday's reference ET0 (mm).
pub(crate) const ET0_TOPIC: &str = "irrigation/et0";

/// Subscription pattern for the per-zone manual balance override.
pub(crate) const BALANCE_SET_PATTERN: &str = "irrigation/+/balance/set";

/// Retained topic carrying a zone's state document.
pub(crate) fn zone_state_topic(zone_id: &str) -> String {
    format!("irrigation/{zone_id}/state")
}

/// Extract zone_id from "irrigation/<zone_id>/balance/set".
pub(crate) fn extract_balance_zone(topic: &str) -> Option<&str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 4
        && parts[0] == "irrigation"
        && parts[2] == "balance"
        && parts[3] == "set"
        && !parts[1].is_empty()
    {
        Some(parts[1])
    } else {
        None
    }
}

/// Parse a plain numeric sensor payload. Non-finite values are rejected
/// here so they never reach the observation store.
pub(crate) fn parse_sensor_value(payload: &[u8]) -> Result<f64, String> {
    let s = String::from_utf8_lossy(payload);
    let trimmed = s.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("not a numeric reading: '{trimmed}'")),
    }
}

/// Parse an "ON"/"OFF" sprinkler state payload (case-insensitive, trims
/// whitespace).
pub(crate) fn parse_switch_state(payload: &[u8]) -> Result<bool, String> {
    let s = String::from_utf8_lossy(payload).trim().to_uppercase();
    match s.as_str() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => Err(format!("unknown sprinkler state '{s}'")),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- extract_balance_zone -----------------------------------------------

    #[test]
    fn extract_balance_zone_valid_topic() {
        assert_eq!(
            extract_balance_zone("irrigation/lawn/balance/set"),
            Some("lawn")
        );
    }

    #[test]
    fn extract_balance_zone_wrong_prefix() {
        assert_eq!(extract_balance_zone("sprinkler/lawn/balance/set"), None);
    }

    #[test]
    fn extract_balance_zone_wrong_suffix() {
        assert_eq!(extract_balance_zone("irrigation/lawn/balance/get"), None);
    }

    #[test]
    fn extract_balance_zone_too_few_segments() {
        assert_eq!(extract_balance_zone("irrigation/balance/set"), None);
    }

    #[test]
    fn extract_balance_zone_empty_zone() {
        assert_eq!(extract_balance_zone("irrigation//balance/set"), None);
    }

    #[test]
    fn extract_balance_zone_empty_string() {
        assert_eq!(extract_balance_zone(""), None);
    }

    // -- parse_sensor_value ---------------------------------------------------

    #[test]
    fn parse_sensor_value_plain_number() {
        assert_eq!(parse_sensor_value(b"21.5"), Ok(21.5));
    }

    #[test]
    fn parse_sensor_value_negative() {
        assert_eq!(parse_sensor_value(b"-4.2"), Ok(-4.2));
    }

    #[test]
    fn parse_sensor_value_with_whitespace() {
        assert_eq!(parse_sensor_value(b"  1013.2\n"), Ok(1013.2));
    }

    #[test]
    fn parse_sensor_value_integer() {
        assert_eq!(parse_sensor_value(b"55"), Ok(55.0));
    }

    #[test]
    fn parse_sensor_value_garbage() {
        assert!(parse_sensor_value(b"unavailable").is_err());
    }

    #[test]
    fn parse_sensor_value_empty() {
        assert!(parse_sensor_value(b"").is_err());
    }

    #[test]
    fn parse_sensor_value_nan_rejected() {
        assert!(parse_sensor_value(b"NaN").is_err());
        assert!(parse_sensor_value(b"inf").is_err());
    }

    // -- parse_switch_state ----------------------------------------------------

    #[test]
    fn parse_switch_state_on_uppercase() {
        assert_eq!(parse_switch_state(b"ON"), Ok(true));
    }

    #[test]
    fn parse_switch_state_off_uppercase() {
        assert_eq!(parse_switch_state(b"OFF"), Ok(false));
    }

    #[test]
    fn parse_switch_state_mixed_case() {
        assert_eq!(parse_switch_state(b"on"), Ok(true));
        assert_eq!(parse_switch_state(b"oFf"), Ok(false));
    }

    #[test]
    fn parse_switch_state_with_whitespace() {
        assert_eq!(parse_switch_state(b"  ON  "), Ok(true));
        assert_eq!(parse_switch_state(b"\tOFF\n"), Ok(false));
    }

    #[test]
    fn parse_switch_state_garbage() {
        assert!(parse_switch_state(b"TOGGLE").is_err());
        assert!(parse_switch_state(b"").is_err());
    }

    // -- topics ------------------------------------------------------------

    #[test]
    fn zone_state_topic_format() {
        assert_eq!(zone_state_topic("lawn"), "irrigation/lawn/state");
    }
}
