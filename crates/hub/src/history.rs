//! Bounded, newest-first log of received snapshots with calendar-date
//! filtering.
//!
//! Records are inserted at the front and the tail is truncated, so the log is
//! ordered by receipt time descending. Receipt time equals capture time
//! because the hub stamps every snapshot itself.

use serde::Serialize;
use std::collections::VecDeque;
use time::macros::{format_description, time};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::feed::Snapshot;

/// A snapshot plus the capture timestamp assigned by the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// `DD/MM/YYYY HH:MM:SS` in the dashboard's UTC offset.
    pub time: String,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

pub fn unix_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn format_display_time(t: OffsetDateTime) -> String {
    t.format(format_description!(
        "[day]/[month]/[year] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| unix_ms(t).to_string())
}

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// Inclusive range of calendar days. Only constructible with both bounds
/// present and `start <= end`; anything else means "no filter".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: Date,
    end: Date,
}

impl DateRange {
    pub fn new(start: Option<Date>, end: Option<Date>) -> Option<Self> {
        match (start, end) {
            (Some(start), Some(end)) if start <= end => Some(Self { start, end }),
            _ => None,
        }
    }

    /// Parse `YYYY-MM-DD` bounds. Malformed input yields `None`.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Option<Self> {
        Self::new(start.and_then(parse_date), end.and_then(parse_date))
    }

    /// `[start 00:00:00.000, end 23:59:59.999]` in `offset`, as epoch ms.
    pub fn bounds_ms(&self, offset: UtcOffset) -> (i64, i64) {
        let from = PrimitiveDateTime::new(self.start, Time::MIDNIGHT).assume_offset(offset);
        let to = PrimitiveDateTime::new(self.end, time!(23:59:59.999)).assume_offset(offset);
        (unix_ms(from), unix_ms(to))
    }
}

fn parse_date(s: &str) -> Option<Date> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]")).ok()
}

// ---------------------------------------------------------------------------
// Query result
// ---------------------------------------------------------------------------

/// Outcome of [`HistoryStore::query`]. `NoData` is only produced when a
/// filter was applied and nothing matched.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryQuery {
    Unfiltered(Vec<Record>),
    Filtered(Vec<Record>),
    NoData,
}

impl HistoryQuery {
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Unfiltered(r) | Self::Filtered(r) => r,
            Self::NoData => &[],
        }
    }

    pub fn total(&self) -> usize {
        self.records().len()
    }

    /// At most `limit` records, newest first.
    pub fn display(&self, limit: usize) -> &[Record] {
        let records = self.records();
        &records[..records.len().min(limit)]
    }

    pub fn is_filtered(&self) -> bool {
        !matches!(self, Self::Unfiltered(_))
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct HistoryStore {
    capacity: usize,
    offset: UtcOffset,
    log: VecDeque<Record>,
}

impl HistoryStore {
    pub fn new(capacity: usize, offset: UtcOffset) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            offset,
            log: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Most recently received record.
    pub fn newest(&self) -> Option<&Record> {
        self.log.front()
    }

    /// Stamp `snapshot` with the current time and store it at the front.
    pub fn record(&mut self, snapshot: Snapshot) -> Record {
        self.record_at(snapshot, OffsetDateTime::now_utc())
    }

    pub fn record_at(&mut self, snapshot: Snapshot, now: OffsetDateTime) -> Record {
        let record = Record {
            timestamp: unix_ms(now),
            time: format_display_time(now.to_offset(self.offset)),
            snapshot,
        };
        self.log.push_front(record.clone());
        self.log.truncate(self.capacity);
        record
    }

    /// Replace the log with previously persisted records.
    pub fn restore(&mut self, records: impl IntoIterator<Item = Record>) {
        let mut records: Vec<Record> = records.into_iter().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(self.capacity);
        self.log = records.into();
    }

    pub fn query(&self, range: Option<&DateRange>) -> HistoryQuery {
        let Some(range) = range else {
            return HistoryQuery::Unfiltered(self.log.iter().cloned().collect());
        };

        let (from, to) = range.bounds_ms(self.offset);
        let matched: Vec<Record> = self
            .log
            .iter()
            .filter(|r| (from..=to).contains(&r.timestamp))
            .cloned()
            .collect();

        if matched.is_empty() {
            HistoryQuery::NoData
        } else {
            HistoryQuery::Filtered(matched)
        }
    }

    pub fn reset(&mut self) {
        self.log.clear();
    }
}
