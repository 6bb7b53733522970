//! `centinela-types` – shared vocabulary for the Centinela security bridge.
//!
//! Sensor identifiers, the three state axes (sensor position, arming mode,
//! alarm state), the [`Event`] variants consumed by the policy engine, the
//! [`OutboundMessage`] it emits, and the workspace-wide [`CentinelaError`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod topics;

/// Named binary sensor reporting through the polling transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorId {
    Door,
    Window,
}

impl SensorId {
    /// Every known sensor, in topic order.
    pub const ALL: [SensorId; 2] = [SensorId::Door, SensorId::Window];

    /// Resolve the device path segment used by `/api/{device}`.
    ///
    /// Matching is case-insensitive; unknown names return `None`.
    pub fn from_device(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "puerta" => Some(SensorId::Door),
            "ventana" => Some(SensorId::Window),
            _ => None,
        }
    }

    /// The device path segment for this sensor.
    pub fn device_name(self) -> &'static str {
        match self {
            SensorId::Door => "puerta",
            SensorId::Window => "ventana",
        }
    }

    /// The retained bus topic carrying this sensor's position.
    pub fn topic(self) -> &'static str {
        match self {
            SensorId::Door => topics::DOOR_STATE,
            SensorId::Window => topics::WINDOW_STATE,
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.device_name())
    }
}

/// Last known position of a binary sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Open,
    Closed,
    /// No report received since startup.
    #[default]
    Unknown,
}

impl Position {
    /// Parse a device report literal. Only `ABIERTA` and `CERRADA` are
    /// accepted, after [`normalize_literal`].
    pub fn parse_report(raw: &str) -> Option<Self> {
        match normalize_literal(raw).as_str() {
            topics::OPEN => Some(Position::Open),
            topics::CLOSED => Some(Position::Closed),
            _ => None,
        }
    }

    /// Bus payload for this position. `Unknown` has no wire form.
    pub fn payload(self) -> Option<&'static str> {
        match self {
            Position::Open => Some(topics::OPEN),
            Position::Closed => Some(topics::CLOSED),
            Position::Unknown => None,
        }
    }
}

/// Whether sensor-open events are treated as security violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    Armed,
    #[default]
    Disarmed,
}

impl SecurityMode {
    pub fn is_armed(self) -> bool {
        self == SecurityMode::Armed
    }

    /// Payload echoed on [`topics::SECURITY_STATUS`].
    pub fn payload(self) -> &'static str {
        match self {
            SecurityMode::Armed => topics::ARMED,
            SecurityMode::Disarmed => topics::DISARMED,
        }
    }
}

impl FromStr for SecurityMode {
    type Err = CentinelaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "armed" => Ok(SecurityMode::Armed),
            "disarmed" => Ok(SecurityMode::Disarmed),
            other => Err(CentinelaError::Config(format!(
                "unknown security mode `{other}` (expected `armed` or `disarmed`)"
            ))),
        }
    }
}

/// Process-wide siren state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    #[default]
    Silent,
    Sounding,
}

impl AlarmState {
    pub fn is_sounding(self) -> bool {
        self == AlarmState::Sounding
    }

    /// `ON` / `OFF`, as published on [`topics::ALARM_STATUS`] and returned
    /// to polling devices.
    pub fn payload(self) -> &'static str {
        match self {
            AlarmState::Sounding => topics::ALARM_ON,
            AlarmState::Silent => topics::ALARM_OFF,
        }
    }
}

/// Per-sensor record held by the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorState {
    pub position: Position,
    /// `None` until the first validated report.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Consistent point-in-time copy of the whole state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub security: SecurityMode,
    pub alarm: AlarmState,
    pub sensors: BTreeMap<SensorId, SensorState>,
}

impl Snapshot {
    /// State at process start: every sensor unknown, alarm silent.
    pub fn initial(security: SecurityMode) -> Self {
        Self {
            security,
            alarm: AlarmState::Silent,
            sensors: SensorId::ALL
                .into_iter()
                .map(|id| (id, SensorState::default()))
                .collect(),
        }
    }

    pub fn sensor(&self, id: SensorId) -> SensorState {
        self.sensors.get(&id).copied().unwrap_or_default()
    }
}

/// Inputs to the policy engine.
///
/// Sensor reports carry the raw device name and reading so that validation
/// happens in one place, inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    SensorReport { sensor: String, reading: String },
    SecurityCommand { enable: bool },
    AlarmSilenceCommand,
    /// Read-only; never mutates state.
    AlarmStatusQuery,
}

/// A bus publish produced by the policy engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl OutboundMessage {
    /// A retained publish, the only kind the engine emits.
    pub fn retained(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: true,
        }
    }
}

/// Strip double quotes, trim, and upper-case a text literal received from a
/// device or dashboard.
pub fn normalize_literal(raw: &str) -> String {
    raw.replace('"', "").trim().to_uppercase()
}

/// Error type shared by every Centinela crate.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentinelaError {
    #[error("Unrecognized sensor: {0}")]
    UnrecognizedSensor(String),

    #[error("Invalid payload for {context}: {payload:?}")]
    InvalidPayload { context: String, payload: String },

    #[error("Publish failure: {0}")]
    PublishFailure(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
