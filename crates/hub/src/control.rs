//! Operator commands (actuator toggles and mode switch) and the task that
//! forwards them to the device over MQTT.

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::feed::{control_topic, Mode, SwitchState};
use crate::session::SharedSession;

/// Capacity of the queue between the web API and the MQTT forwarder.
pub const COMMAND_QUEUE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    Pump,
    Misting,
    Shading,
    Led,
}

impl Actuator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pump => "pump",
            Self::Misting => "misting",
            Self::Shading => "shading",
            Self::Led => "led",
        }
    }
}

impl FromStr for Actuator {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pump" => Ok(Self::Pump),
            "misting" => Ok(Self::Misting),
            "shading" => Ok(Self::Shading),
            "led" => Ok(Self::Led),
            _ => Err(ControlError::UnknownTarget(s.to_string())),
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Switch(Actuator, SwitchState),
    Mode(Mode),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("unknown control target '{0}'")]
    UnknownTarget(String),
    #[error("invalid value '{value}' for {target}")]
    InvalidValue { target: String, value: String },
    #[error("{0} cannot be switched while the device is in auto mode")]
    AutoMode(Actuator),
}

impl ControlCommand {
    /// Build a command from a target name ("pump", "mode", ...) and a value
    /// ("on"/"off" or "auto"/"manual").
    pub fn parse(target: &str, value: &str) -> Result<Self, ControlError> {
        let invalid = || ControlError::InvalidValue {
            target: target.to_string(),
            value: value.to_string(),
        };

        if target.trim().eq_ignore_ascii_case("mode") {
            return value.parse().map(Self::Mode).map_err(|_| invalid());
        }

        let actuator: Actuator = target.parse()?;
        let state: SwitchState = value.parse().map_err(|_| invalid())?;
        Ok(Self::Switch(actuator, state))
    }

    pub fn target(&self) -> &'static str {
        match self {
            Self::Switch(a, _) => a.as_str(),
            Self::Mode(_) => "mode",
        }
    }

    pub fn payload(&self) -> &'static str {
        match self {
            Self::Switch(_, s) => s.as_str(),
            Self::Mode(m) => m.as_str(),
        }
    }

    /// Actuators are owned by the device while it runs in auto mode.
    pub fn check_allowed(&self, mode: Mode) -> Result<(), ControlError> {
        match (self, mode) {
            (Self::Switch(a, _), Mode::Auto) => Err(ControlError::AutoMode(*a)),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.target(), self.payload())
    }
}

pub fn channel() -> (mpsc::Sender<ControlCommand>, mpsc::Receiver<ControlCommand>) {
    mpsc::channel(COMMAND_QUEUE)
}

/// Publish queued commands until every sender is dropped. Failed publishes
/// are reported to the session and not retried.
pub async fn forward(
    mut commands: mpsc::Receiver<ControlCommand>,
    client: AsyncClient,
    device_id: String,
    shared: SharedSession,
) {
    while let Some(cmd) = commands.recv().await {
        let topic = control_topic(&device_id, cmd.target());
        match client
            .publish(&topic, QoS::AtLeastOnce, false, cmd.payload())
            .await
        {
            Ok(()) => info!(%topic, payload = cmd.payload(), "control published"),
            Err(e) => {
                error!(%topic, error = %e, "control publish failed");
                let mut st = shared.write().await;
                st.record_error(format!("failed to send {cmd}: {e}"));
            }
        }
    }
}
