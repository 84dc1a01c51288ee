//! Actuator and mode state held by the device, plus the threshold rules it
//! follows in auto mode.

use serde::Serialize;

use crate::sim::Climate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    #[default]
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    fn from_bool(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Auto,
    #[default]
    Manual,
}

/// Hysteresis thresholds for auto mode. Each actuator turns on past the first
/// value and off past the second.
#[derive(Debug, Clone, Copy)]
pub struct AutoRules {
    /// Pump on below / off above (% relative humidity).
    pub humidity_low: f64,
    pub humidity_ok: f64,
    /// Misting on above / off below (°C).
    pub temp_high: f64,
    pub temp_ok: f64,
    /// Shading on above / off below (lux).
    pub light_high: f64,
    pub light_ok: f64,
    /// LED grow light on below / off above (lux).
    pub light_low: f64,
    pub light_enough: f64,
}

impl Default for AutoRules {
    fn default() -> Self {
        Self {
            humidity_low: 50.0,
            humidity_ok: 70.0,
            temp_high: 32.0,
            temp_ok: 29.0,
            light_high: 1500.0,
            light_ok: 1000.0,
            light_low: 200.0,
            light_enough: 400.0,
        }
    }
}

/// The payload published on `tele/<device_id>/snapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMsg {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub pump_status: Switch,
    pub misting_status: Switch,
    pub shading_status: Switch,
    pub led_status: Switch,
    pub mode: Mode,
}

#[derive(Debug, Default)]
pub struct Device {
    pub pump: Switch,
    pub misting: Switch,
    pub shading: Switch,
    pub led: Switch,
    pub mode: Mode,
    rules: AutoRules,
}

impl Device {
    pub fn new(rules: AutoRules) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Apply a control message for `target` ("pump", ..., "mode"). Actuator
    /// commands are ignored while in auto mode.
    pub fn apply(&mut self, target: &str, payload: &[u8]) -> Result<(), String> {
        let value = String::from_utf8_lossy(payload).trim().to_lowercase();

        if target == "mode" {
            self.mode = match value.as_str() {
                "auto" => Mode::Auto,
                "manual" => Mode::Manual,
                _ => return Err(format!("unknown mode '{value}'")),
            };
            return Ok(());
        }

        let state = match value.as_str() {
            "on" => Switch::On,
            "off" => Switch::Off,
            _ => return Err(format!("unknown switch value '{value}' for {target}")),
        };

        if self.mode == Mode::Auto {
            return Err(format!("{target} is under automatic control"));
        }

        let slot = match target {
            "pump" => &mut self.pump,
            "misting" => &mut self.misting,
            "shading" => &mut self.shading,
            "led" => &mut self.led,
            _ => return Err(format!("unknown control target '{target}'")),
        };
        *slot = state;
        Ok(())
    }

    /// In auto mode, switch actuators from the latest climate reading.
    /// Returns the names of actuators that changed.
    pub fn auto_adjust(&mut self, c: &Climate) -> Vec<&'static str> {
        if self.mode != Mode::Auto {
            return Vec::new();
        }
        let r = self.rules;
        let mut changed = Vec::new();

        let mut set = |slot: &mut Switch, on: Option<bool>, name: &'static str| {
            if let Some(on) = on {
                let next = Switch::from_bool(on);
                if *slot != next {
                    *slot = next;
                    changed.push(name);
                }
            }
        };

        set(&mut self.pump, hysteresis(c.humidity < r.humidity_low, c.humidity > r.humidity_ok), "pump");
        set(&mut self.misting, hysteresis(c.temperature > r.temp_high, c.temperature < r.temp_ok), "misting");
        set(&mut self.shading, hysteresis(c.light > r.light_high, c.light < r.light_ok), "shading");
        set(&mut self.led, hysteresis(c.light < r.light_low, c.light > r.light_enough), "led");

        changed
    }

    pub fn snapshot(&self, c: &Climate) -> SnapshotMsg {
        SnapshotMsg {
            temperature: round1(c.temperature),
            humidity: round1(c.humidity),
            light: c.light.round(),
            pump_status: self.pump,
            misting_status: self.misting,
            shading_status: self.shading,
            led_status: self.led,
            mode: self.mode,
        }
    }
}

/// `Some(true)` to switch on, `Some(false)` to switch off, `None` to hold.
fn hysteresis(turn_on: bool, turn_off: bool) -> Option<bool> {
    if turn_on {
        Some(true)
    } else if turn_off {
        Some(false)
    } else {
        None
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
