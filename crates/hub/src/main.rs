mod config;
mod control;
mod db;
mod export;
mod feed;
mod history;
mod series;
mod session;
mod stats;
mod web;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use db::Db;
use history::Record;
use session::{Session, SharedSession};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let db_url = env::var("DB_URL").unwrap_or_else(|_| "sqlite:farm.db?mode=rwc".to_string());
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

    // ── Config file ─────────────────────────────────────────────────
    let cfg = config::load_or_default(&config_path)?;
    let device_id = cfg.device.device_id.clone();

    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&db_url).await?;
    db.migrate().await?;

    // ── Session (series + history), seeded from persisted records ───
    let mut session = Session::new(
        device_id.clone(),
        cfg.dashboard.series_window,
        cfg.dashboard.history_capacity,
        cfg.dashboard.utc_offset(),
    );
    let restored = db
        .recent_records(cfg.dashboard.history_capacity as i64)
        .await?;
    info!(
        device_id = %device_id,
        restored = restored.len(),
        series_window = cfg.dashboard.series_window,
        history_capacity = cfg.dashboard.history_capacity,
        "db ready"
    );
    session.restore(restored);
    session.record_system("hub started".to_string());
    let shared = session.into_shared();

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new("farm-hub", broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    let snapshot_topic = feed::snapshot_topic(&device_id);
    let control_filter = feed::control_topic(&device_id, "+");
    client
        .subscribe(snapshot_topic.as_str(), QoS::AtLeastOnce)
        .await
        .with_context(|| format!("failed to subscribe {snapshot_topic}"))?;
    client
        .subscribe(control_filter.as_str(), QoS::AtLeastOnce)
        .await
        .with_context(|| format!("failed to subscribe {control_filter}"))?;
    info!(%snapshot_topic, %control_filter, "hub subscribed");

    // ── Control forwarding + web server ─────────────────────────────
    let (commands, command_rx) = control::channel();
    tokio::spawn(control::forward(
        command_rx,
        client.clone(),
        device_id.clone(),
        shared.clone(),
    ));

    let web_state = web::AppState {
        session: shared.clone(),
        commands,
        display_limit: cfg.dashboard.display_limit,
    };
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_state).await {
            error!(error = %format!("{e:#}"), "web server stopped");
        }
    });

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                handle_publish(&p.topic, &p.payload, &shared, &db).await;
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                let mut st = shared.write().await;
                st.mqtt_connected = true;
                st.record_system("mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_system("mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "mqtt error, reconnecting");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_error(format!("mqtt error: {e}"));
                drop(st);

                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

async fn handle_publish(topic: &str, payload: &[u8], shared: &SharedSession, db: &Db) {
    if let Some(device_id) = feed::extract_device_id(topic) {
        match feed::parse_snapshot(payload) {
            Ok(snapshot) => {
                let record = shared.write().await.handle_snapshot(snapshot);
                debug!(
                    device_id,
                    ts = record.timestamp,
                    temperature = record.snapshot.temperature,
                    humidity = record.snapshot.humidity,
                    light = record.snapshot.light,
                    "snapshot"
                );
                persist(db.clone(), shared.clone(), record);
            }
            Err(e) => {
                warn!(%topic, error = %e, "bad snapshot json");
                shared
                    .write()
                    .await
                    .record_error(format!("bad snapshot json: {e}"));
            }
        }
    } else if let Some((_, name)) = feed::parse_control_topic(topic) {
        let value = String::from_utf8_lossy(payload);
        info!(control = name, value = %value.trim(), "control updated");
        shared
            .write()
            .await
            .record_control(format!("{name} = {}", value.trim()));
    } else {
        warn!(%topic, "unhandled topic");
    }
}

/// Hand a record to the database without holding up the feed.
fn persist(db: Db, shared: SharedSession, record: Record) {
    tokio::spawn(async move {
        if let Err(e) = db.insert_record(&record).await {
            error!(ts = record.timestamp, error = %format!("{e:#}"), "failed to save history");
            shared
                .write()
                .await
                .record_error(format!("failed to save history: {e}"));
        }
    });
}
