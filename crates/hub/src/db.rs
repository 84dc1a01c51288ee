//! SQLite persistence sink for history records.
//!
//! Writes are best-effort: the hub spawns them and never waits on the result
//! before handling the next snapshot.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use crate::feed::Snapshot;
use crate::history::Record;

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    ts: i64,
    time: String,
    temperature: f64,
    humidity: f64,
    light: f64,
    pump_status: String,
    misting_status: String,
    shading_status: String,
    led_status: String,
    mode: String,
}

impl From<HistoryRow> for Record {
    fn from(r: HistoryRow) -> Self {
        Record {
            timestamp: r.ts,
            time: r.time,
            snapshot: Snapshot {
                temperature: r.temperature,
                humidity: r.humidity,
                light: r.light,
                pump_status: r.pump_status.parse().unwrap_or_default(),
                misting_status: r.misting_status.parse().unwrap_or_default(),
                shading_status: r.shading_status.parse().unwrap_or_default(),
                led_status: r.led_status.parse().unwrap_or_default(),
                mode: r.mode.parse().unwrap_or_default(),
            },
        }
    }
}

impl Db {
    /// db_url examples:
    /// - "sqlite:/home/pi/farm/farm.db"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal);

        // Every in-memory connection is its own database.
        let in_memory = db_url.contains(":memory:");
        let mut pool = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool = pool
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = pool
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    /// Store a record keyed by its timestamp. A second record with the same
    /// timestamp replaces the first.
    pub async fn insert_record(&self, r: &Record) -> Result<()> {
        let s = &r.snapshot;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO history (
              ts, time, temperature, humidity, light,
              pump_status, misting_status, shading_status, led_status, mode
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(r.timestamp)
        .bind(&r.time)
        .bind(s.temperature)
        .bind(s.humidity)
        .bind(s.light)
        .bind(s.pump_status.as_str())
        .bind(s.misting_status.as_str())
        .bind(s.shading_status.as_str())
        .bind(s.led_status.as_str())
        .bind(s.mode.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert_record failed ts={}", r.timestamp))?;
        Ok(())
    }

    /// The newest `limit` records, newest first.
    pub async fn recent_records(&self, limit: i64) -> Result<Vec<Record>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT ts, time, temperature, humidity, light,
                   pump_status, misting_status, shading_status, led_status, mode
            FROM history
            ORDER BY ts DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("recent_records failed")?;

        Ok(rows.into_iter().map(Record::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Mode, SwitchState};

    async fn memory_db() -> Db {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn record(ts: i64, temperature: f64) -> Record {
        Record {
            timestamp: ts,
            time: format!("t{ts}"),
            snapshot: Snapshot {
                temperature,
                humidity: 55.5,
                light: 640.0,
                pump_status: SwitchState::On,
                led_status: SwitchState::On,
                mode: Mode::Auto,
                ..Snapshot::default()
            },
        }
    }

    #[tokio::test]
    async fn insert_then_load() {
        let db = memory_db().await;
        let r = record(1_000, 24.5);
        db.insert_record(&r).await.unwrap();

        let loaded = db.recent_records(10).await.unwrap();
        assert_eq!(loaded, vec![r]);
    }

    #[tokio::test]
    async fn recent_records_newest_first_and_limited() {
        let db = memory_db().await;
        for ts in [3_000, 1_000, 2_000, 4_000] {
            db.insert_record(&record(ts, ts as f64)).await.unwrap();
        }
        let ts: Vec<i64> = db
            .recent_records(3)
            .await
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(ts, vec![4_000, 3_000, 2_000]);
    }

    #[tokio::test]
    async fn same_timestamp_replaces() {
        let db = memory_db().await;
        db.insert_record(&record(1_000, 20.0)).await.unwrap();
        db.insert_record(&record(1_000, 21.0)).await.unwrap();
        let loaded = db.recent_records(10).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].snapshot.temperature, 21.0);
    }

    #[tokio::test]
    async fn empty_table_loads_nothing() {
        let db = memory_db().await;
        assert!(db.recent_records(100).await.unwrap().is_empty());
    }
}
