//! TOML config file loading and validation for the device identity and the
//! dashboard buffer sizes.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use time::UtcOffset;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceSection,
    pub dashboard: DashboardSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    pub device_id: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            device_id: "greenhouse-1".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DashboardSection {
    /// Samples kept per live chart.
    pub series_window: usize,
    /// Snapshots kept in the history log.
    pub history_capacity: usize,
    /// Rows shown by the history table.
    pub display_limit: usize,
    /// Offset used for display times and calendar-day filtering.
    pub utc_offset_hours: i8,
}

impl Default for DashboardSection {
    fn default() -> Self {
        Self {
            series_window: 20,
            history_capacity: 100,
            display_limit: 50,
            utc_offset_hours: 7,
        }
    }
}

impl DashboardSection {
    pub fn utc_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }
}

const MAX_SERIES_WINDOW: usize = 1_000;
const MAX_HISTORY_CAPACITY: usize = 100_000;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_device(&mut errors);
        self.validate_dashboard(&mut errors);

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

    fn validate_device(&self, errors: &mut Vec<String>) {
        let id = &self.device.device_id;
        if id.trim().is_empty() {
            errors.push("device.device_id is empty".to_string());
        } else if id.contains(['/', '+', '#']) {
            errors.push(format!(
                "device.device_id '{id}' must not contain '/', '+' or '#'"
            ));
        }
    }

    fn validate_dashboard(&self, errors: &mut Vec<String>) {
        let d = &self.dashboard;

        if !(1..=MAX_SERIES_WINDOW).contains(&d.series_window) {
            errors.push(format!(
                "dashboard.series_window {} out of range [1, {MAX_SERIES_WINDOW}]",
                d.series_window
            ));
        }
        if !(1..=MAX_HISTORY_CAPACITY).contains(&d.history_capacity) {
            errors.push(format!(
                "dashboard.history_capacity {} out of range [1, {MAX_HISTORY_CAPACITY}]",
                d.history_capacity
            ));
        }
        if d.display_limit == 0 {
            errors.push("dashboard.display_limit must be positive, got 0".to_string());
        }
        if !(-12..=14).contains(&d.utc_offset_hours) {
            errors.push(format!(
                "dashboard.utc_offset_hours {} out of range [-12, 14]",
                d.utc_offset_hours
            ));
        }
    }
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

/// Like [`load`], but a missing file yields the defaults.
pub fn load_or_default(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        load(path)
    } else {
        tracing::warn!(path, "config file not found, using defaults");
        Ok(Config::default())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[device]
device_id = "cabai-1"

[dashboard]
series_window = 30
history_capacity = 500
display_limit = 25
utc_offset_hours = 8
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.device_id, "cabai-1");
        assert_eq!(config.dashboard.series_window, 30);
        assert_eq!(config.dashboard.history_capacity, 500);
        assert_eq!(config.dashboard.display_limit, 25);
        assert_eq!(config.dashboard.utc_offset(), UtcOffset::from_hms(8, 0, 0).unwrap());
        config.validate().unwrap();
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.device.device_id, "greenhouse-1");
        assert_eq!(config.dashboard.series_window, 20);
        assert_eq!(config.dashboard.history_capacity, 100);
        assert_eq!(config.dashboard.display_limit, 50);
        assert_eq!(config.dashboard.utc_offset_hours, 7);
        config.validate().unwrap();
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[dashboard]\nseries_window = 5\n").unwrap();
        assert_eq!(config.dashboard.series_window, 5);
        assert_eq!(config.dashboard.history_capacity, 100);
    }

    // -- Validation -------------------------------------------------------

    #[test]
    fn empty_device_id_rejected() {
        let mut cfg = Config::default();
        cfg.device.device_id = "  ".into();
        assert_validation_err(&cfg, "device_id is empty");
    }

    #[test]
    fn wildcard_device_id_rejected() {
        let mut cfg = Config::default();
        cfg.device.device_id = "gh/1".into();
        assert_validation_err(&cfg, "must not contain");
        cfg.device.device_id = "gh+".into();
        assert_validation_err(&cfg, "must not contain");
    }

    #[test]
    fn zero_series_window_rejected() {
        let mut cfg = Config::default();
        cfg.dashboard.series_window = 0;
        assert_validation_err(&cfg, "series_window 0 out of range");
    }

    #[test]
    fn huge_history_rejected() {
        let mut cfg = Config::default();
        cfg.dashboard.history_capacity = MAX_HISTORY_CAPACITY + 1;
        assert_validation_err(&cfg, "history_capacity");
    }

    #[test]
    fn zero_display_limit_rejected() {
        let mut cfg = Config::default();
        cfg.dashboard.display_limit = 0;
        assert_validation_err(&cfg, "display_limit must be positive");
    }

    #[test]
    fn offset_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.dashboard.utc_offset_hours = 15;
        assert_validation_err(&cfg, "utc_offset_hours 15");
        cfg.dashboard.utc_offset_hours = -13;
        assert_validation_err(&cfg, "utc_offset_hours -13");
    }

    #[test]
    fn all_errors_reported_together() {
        let mut cfg = Config::default();
        cfg.device.device_id = String::new();
        cfg.dashboard.series_window = 0;
        cfg.dashboard.display_limit = 0;
        assert_validation_err(&cfg, "3 errors");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_or_default("/definitely/not/here/farm.toml").unwrap();
        assert_eq!(cfg.dashboard.series_window, 20);
    }

    #[test]
    fn load_reports_parse_errors() {
        let path = std::env::temp_dir().join("farm-hub-bad-config.toml");
        std::fs::write(&path, "[dashboard]\nseries_window = \"many\"\n").unwrap();
        let err = load(path.to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
        let _ = std::fs::remove_file(&path);
    }
}
