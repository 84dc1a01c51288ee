//! Inbound feed: snapshot payloads published by the greenhouse device and the
//! topic layout shared with it.
//!
//! Every payload goes through [`normalize`] before it reaches the session, so
//! the series buffer and history store only ever see fully-populated
//! [`Snapshot`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// State of a single actuator (pump, misting, shading, LED).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    #[default]
    Off,
}

impl SwitchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl FromStr for SwitchState {
    type Err = String;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(format!("unknown switch state '{other}'")),
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device control mode. In `Auto` the device drives its own actuators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Auto,
    #[default]
    Manual,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// A fully-normalized sensor/control snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub pump_status: SwitchState,
    pub misting_status: SwitchState,
    pub shading_status: SwitchState,
    pub led_status: SwitchState,
    pub mode: Mode,
}

/// Payload exactly as the device publishes it. Which fields are present
/// depends on the firmware variant, and numbers sometimes arrive as strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    #[serde(default)]
    pub temperature: Option<Value>,
    #[serde(default)]
    pub humidity: Option<Value>,
    #[serde(default)]
    pub light: Option<Value>,
    #[serde(default)]
    pub pump_status: Option<Value>,
    #[serde(default)]
    pub misting_status: Option<Value>,
    #[serde(default)]
    pub shading_status: Option<Value>,
    #[serde(default)]
    pub led_status: Option<Value>,
    #[serde(default)]
    pub mode: Option<Value>,
}

/// Apply the per-field defaults: missing, unparseable or non-finite numbers
/// become `0`, unknown statuses become `off`, unknown modes become `manual`.
pub fn normalize(raw: &RawSnapshot) -> Snapshot {
    Snapshot {
        temperature: coerce_number(raw.temperature.as_ref()),
        humidity: coerce_number(raw.humidity.as_ref()),
        light: coerce_number(raw.light.as_ref()),
        pump_status: coerce_status(raw.pump_status.as_ref()),
        misting_status: coerce_status(raw.misting_status.as_ref()),
        shading_status: coerce_status(raw.shading_status.as_ref()),
        led_status: coerce_status(raw.led_status.as_ref()),
        mode: raw
            .mode
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
    }
}

/// Decode and normalize a snapshot payload. Only a payload that is not a JSON
/// object is an error; individual fields never are.
pub fn parse_snapshot(payload: &[u8]) -> Result<Snapshot, serde_json::Error> {
    let raw: RawSnapshot = serde_json::from_slice(payload)?;
    Ok(normalize(&raw))
}

fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_leading_float(s),
        _ => None,
    };
    n.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn coerce_status(value: Option<&Value>) -> SwitchState {
    value
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

/// Parse the longest numeric prefix of `s`, so "23.5C" reads as 23.5.
fn parse_leading_float(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }
    let prefix_len = s
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    (1..=prefix_len)
        .rev()
        .find_map(|end| s[..end].parse::<f64>().ok())
}

// ---------------------------------------------------------------------------
// Topic helpers
// ---------------------------------------------------------------------------

/// "tele/<device_id>/snapshot"
pub fn snapshot_topic(device_id: &str) -> String {
    format!("tele/{device_id}/snapshot")
}

/// "control/<device_id>/<target>"
pub fn control_topic(device_id: &str, target: &str) -> String {
    format!("control/{device_id}/{target}")
}

/// Extract device_id from "tele/<device_id>/snapshot".
pub fn extract_device_id(topic: &str) -> Option<&str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 3 && parts[0] == "tele" && parts[2] == "snapshot" && !parts[1].is_empty() {
        Some(parts[1])
    } else {
        None
    }
}

/// Split "control/<device_id>/<target>" into `(device_id, target)`.
pub fn parse_control_topic(topic: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 3 && parts[0] == "control" && !parts[1].is_empty() && !parts[2].is_empty()
    {
        Some((parts[1], parts[2]))
    } else {
        None
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- normalize ------------------------------------------------------------

    #[test]
    fn full_payload_is_kept() {
        let json = r#"{
            "temperature": 28.4, "humidity": 71.0, "light": 1200,
            "pumpStatus": "on", "mistingStatus": "off", "shadingStatus": "on",
            "ledStatus": "off", "mode": "auto"
        }"#;
        let s = parse_snapshot(json.as_bytes()).unwrap();
        assert_eq!(s.temperature, 28.4);
        assert_eq!(s.humidity, 71.0);
        assert_eq!(s.light, 1200.0);
        assert_eq!(s.pump_status, SwitchState::On);
        assert_eq!(s.misting_status, SwitchState::Off);
        assert_eq!(s.shading_status, SwitchState::On);
        assert_eq!(s.led_status, SwitchState::Off);
        assert_eq!(s.mode, Mode::Auto);
    }

    #[test]
    fn empty_object_gets_defaults() {
        let s = parse_snapshot(b"{}").unwrap();
        assert_eq!(s, Snapshot::default());
        assert_eq!(s.pump_status, SwitchState::Off);
        assert_eq!(s.mode, Mode::Manual);
    }

    #[test]
    fn numeric_strings_are_parsed() {
        let s = parse_snapshot(br#"{"temperature":"27.5","light":"800 lux"}"#).unwrap();
        assert_eq!(s.temperature, 27.5);
        assert_eq!(s.light, 800.0);
    }

    #[test]
    fn garbage_numbers_become_zero() {
        let s = parse_snapshot(br#"{"temperature":"hot","humidity":null,"light":true}"#).unwrap();
        assert_eq!(s.temperature, 0.0);
        assert_eq!(s.humidity, 0.0);
        assert_eq!(s.light, 0.0);
    }

    #[test]
    fn nan_string_becomes_zero() {
        let s = parse_snapshot(br#"{"temperature":"NaN"}"#).unwrap();
        assert_eq!(s.temperature, 0.0);
    }

    #[test]
    fn infinite_strings_become_zero() {
        let s = parse_snapshot(br#"{"temperature":"inf","humidity":"1e999","light":"-Infinity"}"#)
            .unwrap();
        assert_eq!(s.temperature, 0.0);
        assert_eq!(s.humidity, 0.0);
        assert_eq!(s.light, 0.0);
    }

    #[test]
    fn unknown_statuses_fall_back() {
        let s = parse_snapshot(br#"{"pumpStatus":"maybe","mode":"turbo","ledStatus":1}"#).unwrap();
        assert_eq!(s.pump_status, SwitchState::Off);
        assert_eq!(s.led_status, SwitchState::Off);
        assert_eq!(s.mode, Mode::Manual);
    }

    #[test]
    fn statuses_are_case_insensitive() {
        let s = parse_snapshot(br#"{"pumpStatus":" ON ","mode":"AUTO"}"#).unwrap();
        assert_eq!(s.pump_status, SwitchState::On);
        assert_eq!(s.mode, Mode::Auto);
    }

    #[test]
    fn extra_fields_ignored() {
        let s = parse_snapshot(br#"{"temperature":20,"rssi":-60}"#).unwrap();
        assert_eq!(s.temperature, 20.0);
    }

    #[test]
    fn non_object_payload_is_error() {
        assert!(parse_snapshot(b"[1,2,3]").is_err());
        assert!(parse_snapshot(b"not json").is_err());
    }

    #[test]
    fn snapshot_serializes_with_feed_field_names() {
        let json = serde_json::to_value(Snapshot::default()).unwrap();
        assert_eq!(json["pumpStatus"], "off");
        assert_eq!(json["ledStatus"], "off");
        assert_eq!(json["mode"], "manual");
    }

    // -- topics ---------------------------------------------------------------

    #[test]
    fn extract_device_id_valid_topic() {
        assert_eq!(extract_device_id("tele/greenhouse-1/snapshot"), Some("greenhouse-1"));
    }

    #[test]
    fn extract_device_id_rejects_other_topics() {
        assert_eq!(extract_device_id("tele/greenhouse-1/reading"), None);
        assert_eq!(extract_device_id("foo/greenhouse-1/snapshot"), None);
        assert_eq!(extract_device_id("tele//snapshot"), None);
        assert_eq!(extract_device_id("tele/a/b/snapshot"), None);
        assert_eq!(extract_device_id(""), None);
    }

    #[test]
    fn parse_control_topic_valid() {
        assert_eq!(
            parse_control_topic("control/greenhouse-1/pump"),
            Some(("greenhouse-1", "pump"))
        );
    }

    #[test]
    fn parse_control_topic_invalid() {
        assert_eq!(parse_control_topic("control/greenhouse-1"), None);
        assert_eq!(parse_control_topic("control/greenhouse-1/"), None);
        assert_eq!(parse_control_topic("tele/greenhouse-1/pump"), None);
    }

    #[test]
    fn topic_builders_round_trip() {
        assert_eq!(extract_device_id(&snapshot_topic("gh")), Some("gh"));
        assert_eq!(parse_control_topic(&control_topic("gh", "mode")), Some(("gh", "mode")));
    }
}
