//! Summary statistics over a caller-chosen slice of history records.

use serde::Serialize;

use crate::feed::{Mode, Snapshot, SwitchState};
use crate::history::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricSummary {
    /// Value of the most recent record.
    pub current: f64,
    pub average: f64,
    pub max: f64,
    pub min: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryCount {
    pub count: usize,
    /// 0..=100; zero when there are no records.
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SwitchSummary {
    pub on: CategoryCount,
    pub off: CategoryCount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModeSummary {
    pub auto: CategoryCount,
    pub manual: CategoryCount,
}

/// Display times of the oldest and newest record summarized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Period {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub period: Option<Period>,
    pub temperature: MetricSummary,
    pub humidity: MetricSummary,
    pub light: MetricSummary,
    pub pump: SwitchSummary,
    pub misting: SwitchSummary,
    pub shading: SwitchSummary,
    pub led: SwitchSummary,
    pub mode: ModeSummary,
}

/// Summarize `records`, which must be ordered newest first.
///
/// Empty input yields an all-zero summary.
pub fn statistics(records: &[Record]) -> Summary {
    let total = records.len();
    let period = match (records.last(), records.first()) {
        (Some(oldest), Some(newest)) => Some(Period {
            from: oldest.time.clone(),
            to: newest.time.clone(),
        }),
        _ => None,
    };

    let auto = records
        .iter()
        .filter(|r| r.snapshot.mode == Mode::Auto)
        .count();

    Summary {
        count: total,
        period,
        temperature: summarize_metric(records, |s| s.temperature),
        humidity: summarize_metric(records, |s| s.humidity),
        light: summarize_metric(records, |s| s.light),
        pump: summarize_switch(records, |s| s.pump_status),
        misting: summarize_switch(records, |s| s.misting_status),
        shading: summarize_switch(records, |s| s.shading_status),
        led: summarize_switch(records, |s| s.led_status),
        mode: ModeSummary {
            auto: share(auto, total),
            manual: share(total - auto, total),
        },
    }
}

fn summarize_metric(records: &[Record], value: impl Fn(&Snapshot) -> f64) -> MetricSummary {
    let Some(first) = records.first() else {
        return MetricSummary::default();
    };

    let values = records.iter().map(|r| value(&r.snapshot));
    let sum: f64 = values.clone().sum();

    MetricSummary {
        current: value(&first.snapshot),
        average: sum / records.len() as f64,
        max: values.clone().fold(f64::NEG_INFINITY, f64::max),
        min: values.fold(f64::INFINITY, f64::min),
    }
}

fn summarize_switch(records: &[Record], state: impl Fn(&Snapshot) -> SwitchState) -> SwitchSummary {
    let total = records.len();
    let on = records.iter().filter(|r| state(&r.snapshot).is_on()).count();
    SwitchSummary {
        on: share(on, total),
        off: share(total - on, total),
    }
}

fn share(count: usize, total: usize) -> CategoryCount {
    let percent = if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    };
    CategoryCount { count, percent }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: i64, snapshot: Snapshot) -> Record {
        Record {
            timestamp: ts,
            time: format!("t{ts}"),
            snapshot,
        }
    }

    fn temp(ts: i64, temperature: f64) -> Record {
        record(
            ts,
            Snapshot {
                temperature,
                ..Snapshot::default()
            },
        )
    }

    #[test]
    fn two_temperatures() {
        let s = statistics(&[temp(2, 20.0), temp(1, 30.0)]);
        assert_eq!(s.temperature.average, 25.0);
        assert_eq!(s.temperature.max, 30.0);
        assert_eq!(s.temperature.min, 20.0);
        assert_eq!(s.temperature.current, 20.0);
        assert_eq!(s.count, 2);
    }

    #[test]
    fn empty_input_is_zeroed() {
        let s = statistics(&[]);
        assert_eq!(s, Summary::default());
        assert_eq!(s.temperature.average, 0.0);
        assert_eq!(s.light.max, 0.0);
        assert_eq!(s.humidity.min, 0.0);
        assert_eq!(s.pump.on.percent, 0.0);
        assert_eq!(s.mode.manual.percent, 0.0);
        assert!(s.period.is_none());
    }

    #[test]
    fn period_spans_oldest_to_newest() {
        let s = statistics(&[temp(3, 1.0), temp(2, 1.0), temp(1, 1.0)]);
        let p = s.period.unwrap();
        assert_eq!(p.from, "t1");
        assert_eq!(p.to, "t3");
    }

    #[test]
    fn switch_counts_and_percentages() {
        let on = Snapshot {
            pump_status: SwitchState::On,
            led_status: SwitchState::On,
            mode: Mode::Auto,
            ..Snapshot::default()
        };
        let records = vec![
            record(4, on),
            record(3, on),
            record(2, on),
            record(1, Snapshot::default()),
        ];
        let s = statistics(&records);
        assert_eq!(s.pump.on, CategoryCount { count: 3, percent: 75.0 });
        assert_eq!(s.pump.off, CategoryCount { count: 1, percent: 25.0 });
        assert_eq!(s.led.on.count, 3);
        assert_eq!(s.misting.off.count, 4);
        assert_eq!(s.misting.off.percent, 100.0);
        assert_eq!(s.mode.auto.count, 3);
        assert_eq!(s.mode.manual.count, 1);
    }

    #[test]
    fn negative_values_min_max() {
        let s = statistics(&[temp(2, -5.0), temp(1, -1.0)]);
        assert_eq!(s.temperature.max, -1.0);
        assert_eq!(s.temperature.min, -5.0);
    }

    #[test]
    fn statistics_is_pure() {
        let records = vec![temp(2, 10.0), temp(1, 14.0)];
        let a = statistics(&records);
        let b = statistics(&records[..1]);
        assert_eq!(a, statistics(&records));
        assert_eq!(b.temperature.average, 10.0);
        assert_eq!(records.len(), 2);
    }
}
