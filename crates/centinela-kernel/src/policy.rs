//! [`PolicyEngine`] – the fixed security state machine.
//!
//! Given an [`Event`] and the current [`Snapshot`], the engine mutates the
//! snapshot in place and returns the retained [`OutboundMessage`]s to
//! publish. Rules, in precedence order:
//!
//! | Event | Effect | Outbox |
//! |---|---|---|
//! | `SensorReport` | position updated | sensor topic, always; `ON` on the alarm topic when armed and the report is `ABIERTA` |
//! | `SecurityCommand` | arming mode set | security status topic, always |
//! | `AlarmSilenceCommand` | `SOUNDING` → `SILENT` | `OFF` on the alarm topic, only on an actual transition |
//! | `AlarmStatusQuery` | none | none |
//!
//! Arming mode and alarm state are independent axes: disarming never
//! silences a sounding alarm, and no sensor report ever silences it either.
//!
//! A rejected event (unknown sensor, unrecognised reading) returns an error
//! and leaves the snapshot untouched.

use centinela_types::{
    AlarmState, CentinelaError, Event, OutboundMessage, Position, SecurityMode, SensorId,
    Snapshot, topics,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Apply `event` to `state` and return the messages to publish.
    ///
    /// `now` stamps the `last_updated` field of accepted sensor reports.
    ///
    /// # Errors
    ///
    /// - [`CentinelaError::UnrecognizedSensor`] – the report names a sensor
    ///   outside [`SensorId::ALL`].
    /// - [`CentinelaError::InvalidPayload`] – the reading is neither
    ///   `ABIERTA` nor `CERRADA`.
    pub fn evaluate(
        &self,
        event: &Event,
        state: &mut Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboundMessage>, CentinelaError> {
        match event {
            Event::SensorReport { sensor, reading } => {
                self.sensor_report(sensor, reading, state, now)
            }
            Event::SecurityCommand { enable } => Ok(self.security_command(*enable, state)),
            Event::AlarmSilenceCommand => Ok(self.silence(state)),
            Event::AlarmStatusQuery => Ok(Vec::new()),
        }
    }

    fn sensor_report(
        &self,
        sensor: &str,
        reading: &str,
        state: &mut Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboundMessage>, CentinelaError> {
        let id = SensorId::from_device(sensor)
            .ok_or_else(|| CentinelaError::UnrecognizedSensor(sensor.to_string()))?;
        let position = Position::parse_report(reading).ok_or_else(|| {
            CentinelaError::InvalidPayload {
                context: format!("sensor {id}"),
                payload: reading.to_string(),
            }
        })?;
        // parse_report only yields Open or Closed.
        let payload = position.payload().unwrap_or(topics::CLOSED);

        let entry = state.sensors.entry(id).or_default();
        entry.position = position;
        entry.last_updated = Some(now);
        debug!(sensor = %id, position = payload, "sensor position updated");

        // Re-published even when unchanged so late subscribers stay correct.
        let mut outbox = vec![OutboundMessage::retained(id.topic(), payload)];

        if state.security.is_armed() && position == Position::Open {
            if !state.alarm.is_sounding() {
                info!(sensor = %id, "alarm tripped");
            }
            state.alarm = AlarmState::Sounding;
            outbox.push(OutboundMessage::retained(
                topics::ALARM_STATUS,
                AlarmState::Sounding.payload(),
            ));
        }

        Ok(outbox)
    }

    fn security_command(&self, enable: bool, state: &mut Snapshot) -> Vec<OutboundMessage> {
        let mode = if enable {
            SecurityMode::Armed
        } else {
            SecurityMode::Disarmed
        };
        if state.security != mode {
            info!(mode = mode.payload(), "security mode changed");
        }
        state.security = mode;
        if !enable && state.alarm.is_sounding() {
            warn!("disarmed while the alarm is sounding; alarm stays on until silenced");
        }
        vec![OutboundMessage::retained(
            topics::SECURITY_STATUS,
            mode.payload(),
        )]
    }

    fn silence(&self, state: &mut Snapshot) -> Vec<OutboundMessage> {
        if !state.alarm.is_sounding() {
            debug!("silence requested while alarm already silent");
            return Vec::new();
        }
        state.alarm = AlarmState::Silent;
        info!("alarm silenced");
        vec![OutboundMessage::retained(
            topics::ALARM_STATUS,
            AlarmState::Silent.payload(),
        )]
    }
}
