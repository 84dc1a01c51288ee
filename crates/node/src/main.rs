mod device;
mod sim;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::sleep};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use device::{AutoRules, Device};
use sim::{Actuation, GreenhouseSim, Scenario};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn snapshot_topic(device_id: &str) -> String {
    format!("tele/{device_id}/snapshot")
}

fn control_filter(device_id: &str) -> String {
    format!("control/{device_id}/+")
}

/// The control target of `control/<device_id>/<target>`, if the topic is
/// addressed to this device.
fn control_target<'a>(topic: &'a str, device_id: &str) -> Option<&'a str> {
    let rest = topic.strip_prefix("control/")?;
    let (id, target) = rest.split_once('/')?;
    (id == device_id && !target.is_empty() && !target.contains('/')).then_some(target)
}

fn actuation(device: &Device) -> Actuation {
    Actuation {
        pump: device.pump.is_on(),
        misting: device.misting.is_on(),
        shading: device.shading.is_on(),
        led: device.led.is_on(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Env config
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env_or("MQTT_PORT", 1883);
    let device_id = env::var("DEVICE_ID").unwrap_or_else(|_| "greenhouse-1".to_string());
    let sample_every_s: u64 = env_or("SAMPLE_EVERY_S", 5);
    let diurnal_period_s: f64 = env_or("DIURNAL_PERIOD_S", 86_400.0);
    let utc_offset_hours: i64 = env_or("UTC_OFFSET_HOURS", 7);
    let scenario = Scenario::from_str_lossy(&env::var("SIM_SCENARIO").unwrap_or_default());

    let mut mqttoptions = MqttOptions::new(format!("farm-node-{device_id}"), broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    let filter = control_filter(&device_id);
    client
        .subscribe(filter.as_str(), QoS::AtLeastOnce)
        .await
        .with_context(|| format!("failed to subscribe {filter}"))?;

    let device = Arc::new(Mutex::new(Device::new(AutoRules::default())));

    // Apply incoming control messages and keep the connection alive.
    {
        let device = device.clone();
        let device_id = device_id.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        let Some(target) = control_target(&p.topic, &device_id) else {
                            continue;
                        };
                        match device.lock().await.apply(target, &p.payload) {
                            Ok(()) => info!(control = target, "control applied"),
                            Err(e) => warn!(control = target, error = %e, "control rejected"),
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("node connected to mqtt");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt error, retrying");
                        sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    }

    let topic = snapshot_topic(&device_id);
    info!(%topic, %scenario, sample_every_s, "publishing snapshots");

    let mut sim = GreenhouseSim::new(scenario, diurnal_period_s, utc_offset_hours);

    loop {
        let msg = {
            let mut dev = device.lock().await;
            sim.set_actuation(actuation(&dev));
            let climate = sim.sample();
            for name in dev.auto_adjust(&climate) {
                info!(actuator = name, "auto mode switched actuator");
            }
            dev.snapshot(&climate)
        };

        let payload = serde_json::to_vec(&msg).context("failed to encode snapshot")?;

        if let Err(e) = client
            .publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
        {
            error!(error = %e, "publish error");
        } else {
            debug!(
                temperature = msg.temperature,
                humidity = msg.humidity,
                light = msg.light,
                "published snapshot"
            );
        }

        sleep(Duration::from_secs(sample_every_s)).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
