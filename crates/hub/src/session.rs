use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::RwLock;

use crate::feed::{Mode, Snapshot};
use crate::history::{HistoryStore, Record};
use crate::series::SeriesBuffer;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedSession = Arc<RwLock<Session>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Everything the dashboard knows about one device, owned in one place and
/// fed by the MQTT loop.
pub struct Session {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    pub device_id: String,
    pub series: SeriesBuffer,
    pub history: HistoryStore,
    pub latest: Option<Record>,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Snapshot,
    Control,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub device_id: String,
    pub mode: Mode,
    pub latest: Option<Record>,
    pub series_window: usize,
    pub history_len: usize,
    pub history_capacity: usize,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl Session {
    pub fn new(
        device_id: impl Into<String>,
        series_window: usize,
        history_capacity: usize,
        offset: UtcOffset,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            device_id: device_id.into(),
            series: SeriesBuffer::new(series_window),
            history: HistoryStore::new(history_capacity, offset),
            latest: None,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    /// Feed handler body: store the snapshot in history and the live series.
    /// The returned record is what the persistence sink receives.
    pub fn handle_snapshot(&mut self, snapshot: Snapshot) -> Record {
        self.handle_snapshot_at(snapshot, OffsetDateTime::now_utc())
    }

    pub fn handle_snapshot_at(&mut self, snapshot: Snapshot, now: OffsetDateTime) -> Record {
        let record = self.history.record_at(snapshot, now);
        self.series.push_snapshot(record.timestamp, &record.snapshot);
        self.latest = Some(record.clone());

        let s = &record.snapshot;
        self.push_event(
            EventKind::Snapshot,
            format!(
                "{:.1}°C {:.1}% {:.0} lux pump={} misting={} shading={} led={} mode={}",
                s.temperature,
                s.humidity,
                s.light,
                s.pump_status,
                s.misting_status,
                s.shading_status,
                s.led_status,
                s.mode
            ),
        );

        record
    }

    /// Seed history from persisted records. The newest one becomes the latest
    /// reading, so the status view and the auto-mode lock survive a restart.
    pub fn restore(&mut self, records: Vec<Record>) {
        self.history.restore(records);
        self.latest = self.history.newest().cloned();
    }

    /// Mode last reported by the device; manual until the first snapshot.
    pub fn current_mode(&self) -> Mode {
        self.latest
            .as_ref()
            .map(|r| r.snapshot.mode)
            .unwrap_or_default()
    }

    /// Clear the live series and the history log.
    pub fn reset(&mut self) {
        self.series.reset();
        self.history.reset();
        self.push_event(EventKind::System, "series and history cleared".to_string());
    }

    /// Record a control change (requested by the operator or echoed by the
    /// broker).
    pub fn record_control(&mut self, detail: String) {
        self.push_event(EventKind::Control, detail);
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            device_id: self.device_id.clone(),
            mode: self.current_mode(),
            latest: self.latest.clone(),
            series_window: self.series.window(),
            history_len: self.history.len(),
            history_capacity: self.history.capacity(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}
