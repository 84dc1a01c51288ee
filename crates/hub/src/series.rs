//! Live chart windows: one fixed-capacity FIFO of samples per metric.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::feed::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
    Light,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Temperature, Metric::Humidity, Metric::Light];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Light => "light",
        }
    }

    /// Read this metric's value out of a snapshot.
    pub fn value_of(self, snapshot: &Snapshot) -> f64 {
        match self {
            Self::Temperature => snapshot.temperature,
            Self::Humidity => snapshot.humidity,
            Self::Light => snapshot.light,
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            "light" => Ok(Self::Light),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub value: f64,
}

/// Per-metric sliding windows holding at most `window` samples each.
///
/// Values are stored as given; coercing bad feed values is the caller's job.
pub struct SeriesBuffer {
    window: usize,
    series: HashMap<Metric, VecDeque<Sample>>,
}

impl SeriesBuffer {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            series: HashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Append a sample, evicting the oldest one first when the window is full.
    pub fn push(&mut self, metric: Metric, timestamp: i64, value: f64) {
        let window = self.window;
        let samples = self
            .series
            .entry(metric)
            .or_insert_with(|| VecDeque::with_capacity(window));
        while samples.len() >= window {
            samples.pop_front();
        }
        samples.push_back(Sample { timestamp, value });
    }

    /// Push every metric of `snapshot` at the same timestamp.
    pub fn push_snapshot(&mut self, timestamp: i64, snapshot: &Snapshot) {
        for metric in Metric::ALL {
            self.push(metric, timestamp, metric.value_of(snapshot));
        }
    }

    /// Current window for `metric`, oldest first.
    pub fn snapshot(&self, metric: Metric) -> Vec<Sample> {
        self.series
            .get(&metric)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, metric: Metric) -> usize {
        self.series.get(&metric).map_or(0, VecDeque::len)
    }

    pub fn reset(&mut self) {
        self.series.clear();
    }
}
