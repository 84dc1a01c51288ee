//! Stateful greenhouse climate simulator for running a node without sensors.
//!
//! Models:
//! - Random walk with mean reversion toward a time-of-day target
//! - Diurnal cycle (sun rises at 06:00 local, peaks at 12:00)
//! - Per-reading sensor noise and occasional spikes
//! - Actuator feedback: misting cools and humidifies, shading blocks sun,
//!   the pump wets the soil, the LED adds light

use std::{f64::consts::PI, fmt};
use time::OffsetDateTime;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Simulation profiles selectable via the `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Hot bright days, dry air. Auto mode will run misting and shading.
    Sunny,
    /// Mild and dim. The LED comes on for much of the day.
    Cloudy,
    /// High noise and frequent spikes.
    Flaky,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloudy" => Self::Cloudy,
            "flaky" => Self::Flaky,
            _ => Self::Sunny,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sunny => write!(f, "sunny"),
            Self::Cloudy => write!(f, "cloudy"),
            Self::Flaky => write!(f, "flaky"),
        }
    }
}

struct Profile {
    temp_night: f64,
    temp_day: f64,
    humidity_center: f64,
    peak_lux: f64,
    noise: f64,
    spike_prob: f32,
    spike_sigma: f64,
}

impl Profile {
    fn for_scenario(scenario: Scenario) -> Self {
        match scenario {
            Scenario::Sunny => Self {
                temp_night: 24.0,
                temp_day: 35.0,
                humidity_center: 62.0,
                peak_lux: 2200.0,
                noise: 0.2,
                spike_prob: 0.01,
                spike_sigma: 3.0,
            },
            Scenario::Cloudy => Self {
                temp_night: 22.0,
                temp_day: 27.0,
                humidity_center: 75.0,
                peak_lux: 450.0,
                noise: 0.2,
                spike_prob: 0.01,
                spike_sigma: 3.0,
            },
            Scenario::Flaky => Self {
                temp_night: 23.0,
                temp_day: 31.0,
                humidity_center: 65.0,
                peak_lux: 1500.0,
                noise: 1.0,
                spike_prob: 0.10,
                spike_sigma: 8.0,
            },
        }
    }
}

/// One set of sensor readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    /// °C
    pub temperature: f64,
    /// % relative humidity, 0..=100
    pub humidity: f64,
    /// lux, never negative
    pub light: f64,
}

/// Actuator outputs that feed back into the simulated climate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Actuation {
    pub pump: bool,
    pub misting: bool,
    pub shading: bool,
    pub led: bool,
}

const MISTING_COOLING: f64 = 4.0;
const MISTING_HUMIDITY: f64 = 20.0;
const SHADING_COOLING: f64 = 2.0;
const SHADING_TRANSMISSION: f64 = 0.4;
const PUMP_HUMIDITY: f64 = 6.0;
const LED_LUX: f64 = 250.0;

// ---------------------------------------------------------------------------
// Main simulator
// ---------------------------------------------------------------------------

pub struct GreenhouseSim {
    profile: Profile,
    temperature: f64,
    humidity: f64,
    mean_reversion: f64,
    walk_sigma: f64,
    diurnal_period_s: f64,
    utc_offset_s: i64,
    actuation: Actuation,
}

impl GreenhouseSim {
    /// `diurnal_period_s` is the length of one simulated day. Use 86400 for
    /// real time or something like 600 for fast iteration.
    pub fn new(scenario: Scenario, diurnal_period_s: f64, utc_offset_hours: i64) -> Self {
        let profile = Profile::for_scenario(scenario);
        let temperature = (profile.temp_night + profile.temp_day) / 2.0;
        let humidity = profile.humidity_center;
        Self {
            profile,
            temperature,
            humidity,
            mean_reversion: 0.2,
            walk_sigma: 0.15,
            diurnal_period_s: diurnal_period_s.max(1.0),
            utc_offset_s: utc_offset_hours * 3600,
            actuation: Actuation::default(),
        }
    }

    pub fn set_actuation(&mut self, actuation: Actuation) {
        self.actuation = actuation;
    }

    /// Produce the next reading using the current wall clock.
    pub fn sample(&mut self) -> Climate {
        let local_s = OffsetDateTime::now_utc().unix_timestamp() + self.utc_offset_s;
        self.sample_at(local_s as f64)
    }

    /// Produce the next reading as if the local time were `local_s` seconds
    /// since the epoch. Each call evolves the internal state.
    pub fn sample_at(&mut self, local_s: f64) -> Climate {
        let sun = self.sun(local_s);
        let p = &self.profile;
        let a = self.actuation;

        // -- Evolve toward the time-of-day target --------------------------

        let mut temp_target = p.temp_night + (p.temp_day - p.temp_night) * sun;
        let mut hum_target = p.humidity_center - 15.0 * sun;
        if a.misting {
            temp_target -= MISTING_COOLING;
            hum_target += MISTING_HUMIDITY;
        }
        if a.shading {
            temp_target -= SHADING_COOLING * sun;
        }
        if a.pump {
            hum_target += PUMP_HUMIDITY;
        }

        self.temperature += self.mean_reversion * (temp_target - self.temperature)
            + gaussian(0.0, self.walk_sigma);
        self.humidity += self.mean_reversion * (hum_target - self.humidity)
            + gaussian(0.0, self.walk_sigma * 2.0);
        self.humidity = self.humidity.clamp(0.0, 100.0);

        // -- Instantaneous reading ----------------------------------------

        let transmission = if a.shading { SHADING_TRANSMISSION } else { 1.0 };
        let led = if a.led { LED_LUX } else { 0.0 };
        let light = p.peak_lux * sun * transmission + led;

        Climate {
            temperature: self.temperature + self.noise(p.noise),
            humidity: (self.humidity + self.noise(p.noise * 2.0)).clamp(0.0, 100.0),
            light: (light * (1.0 + 0.03 * approx_std_normal())).max(0.0),
        }
    }

    /// Sun elevation factor in 0..=1, zero between 18:00 and 06:00.
    fn sun(&self, local_s: f64) -> f64 {
        let day_frac = local_s.rem_euclid(self.diurnal_period_s) / self.diurnal_period_s;
        (2.0 * PI * (day_frac - 0.25)).sin().max(0.0)
    }

    fn noise(&self, sigma: f64) -> f64 {
        let spike = if fastrand::f32() < self.profile.spike_prob {
            gaussian(0.0, self.profile.spike_sigma)
        } else {
            0.0
        };
        gaussian(0.0, sigma) + spike
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: f64 = 86_400.0;
    const NOON: f64 = DAY / 2.0;
    const MIDNIGHT: f64 = 0.0;

    fn average(sim: &mut GreenhouseSim, at: f64, n: usize) -> Climate {
        let mut t = 0.0;
        let mut h = 0.0;
        let mut l = 0.0;
        for _ in 0..n {
            let c = sim.sample_at(at);
            t += c.temperature;
            h += c.humidity;
            l += c.light;
        }
        let n = n as f64;
        Climate {
            temperature: t / n,
            humidity: h / n,
            light: l / n,
        }
    }

    #[test]
    fn readings_within_physical_range() {
        let mut sim = GreenhouseSim::new(Scenario::Flaky, 600.0, 0);
        for i in 0..1000 {
            let c = sim.sample_at(i as f64 * 7.0);
            assert!((0.0..=100.0).contains(&c.humidity), "humidity {}", c.humidity);
            assert!(c.light >= 0.0, "light {}", c.light);
            assert!(c.temperature.is_finite());
        }
    }

    #[test]
    fn dark_at_night_bright_at_noon() {
        let mut sim = GreenhouseSim::new(Scenario::Sunny, DAY, 0);
        let night = average(&mut sim, MIDNIGHT, 20);
        let noon = average(&mut sim, NOON, 20);
        assert!(night.light < 1.0, "night light {}", night.light);
        assert!(noon.light > 1800.0, "noon light {}", noon.light);
    }

    #[test]
    fn day_is_warmer_than_night() {
        let mut sim = GreenhouseSim::new(Scenario::Sunny, DAY, 0);
        let night = average(&mut sim, MIDNIGHT, 40);
        let noon = average(&mut sim, NOON, 40);
        assert!(
            noon.temperature > night.temperature + 5.0,
            "noon {:.1} night {:.1}",
            noon.temperature,
            night.temperature
        );
    }

    #[test]
    fn shading_cuts_light() {
        let mut sim = GreenhouseSim::new(Scenario::Sunny, DAY, 0);
        let open = average(&mut sim, NOON, 20);
        sim.set_actuation(Actuation {
            shading: true,
            ..Actuation::default()
        });
        let shaded = average(&mut sim, NOON, 20);
        assert!(shaded.light < open.light * 0.6, "open {:.0} shaded {:.0}", open.light, shaded.light);
    }

    #[test]
    fn misting_cools_and_humidifies() {
        let mut sim = GreenhouseSim::new(Scenario::Sunny, DAY, 0);
        let before = average(&mut sim, NOON, 40);
        sim.set_actuation(Actuation {
            misting: true,
            ..Actuation::default()
        });
        // Let the state settle on the new target.
        average(&mut sim, NOON, 30);
        let after = average(&mut sim, NOON, 40);
        assert!(after.temperature < before.temperature - 2.0);
        assert!(after.humidity > before.humidity + 10.0);
    }

    #[test]
    fn led_lights_the_night() {
        let mut sim = GreenhouseSim::new(Scenario::Cloudy, DAY, 0);
        sim.set_actuation(Actuation {
            led: true,
            ..Actuation::default()
        });
        let night = average(&mut sim, MIDNIGHT, 20);
        assert!((200.0..300.0).contains(&night.light), "led light {}", night.light);
    }

    #[test]
    fn utc_offset_shifts_the_day() {
        let sim = GreenhouseSim::new(Scenario::Sunny, DAY, 7);
        // 05:00 UTC is 12:00 at +7.
        let local = 5.0 * 3600.0 + sim.utc_offset_s as f64;
        assert!((sim.sun(local) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_from_str_lossy() {
        assert_eq!(Scenario::from_str_lossy("sunny"), Scenario::Sunny);
        assert_eq!(Scenario::from_str_lossy("CLOUDY"), Scenario::Cloudy);
        assert_eq!(Scenario::from_str_lossy(" Flaky "), Scenario::Flaky);
        assert_eq!(Scenario::from_str_lossy("unknown"), Scenario::Sunny);
        assert_eq!(Scenario::from_str_lossy(""), Scenario::Sunny);
    }

    #[test]
    fn scenario_display() {
        assert_eq!(Scenario::Sunny.to_string(), "sunny");
        assert_eq!(Scenario::Cloudy.to_string(), "cloudy");
        assert_eq!(Scenario::Flaky.to_string(), "flaky");
    }

    #[test]
    fn approx_std_normal_has_zero_mean() {
        let n = 5000;
        let sum: f64 = (0..n).map(|_| approx_std_normal()).sum();
        let mean = sum / n as f64;
        assert!(mean.abs() < 0.15, "approx_std_normal mean should be near zero: {mean}");
    }
}
