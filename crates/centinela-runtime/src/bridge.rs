//! [`Bridge`] – funnels both transports into one serialized policy path.
//!
//! ```text
//!  POST /api/{device} ──┐                         ┌──▶ retained publish
//!  GET  /api/alarma  ───┼──▶ BridgeHandle ─mpsc─▶ Bridge ──▶ SecurityGate
//!  control topics ──────┘                         └──▶ reply (ack / ON|OFF)
//! ```
//!
//! * **Polling ingress** – [`BridgeHandle::report_sensor`] normalizes the
//!   device name and body and submits a `SensorReport`. The device always
//!   gets the fixed `ok` acknowledgement, whatever the engine decided.
//! * **Polling egress** – [`BridgeHandle::alarm_status`] submits an
//!   `AlarmStatusQuery` and yields `ON`/`OFF` material for the caller.
//! * **Pub/sub ingress** – [`run_pubsub_ingress`] consumes the broker's
//!   inbound stream, drops everything the bridge published itself, and maps
//!   the two control topics to events via [`decode_control`].
//! * **Pub/sub egress** – the loop publishes every outbox entry retained,
//!   before answering the caller, so publish order follows evaluation order.
//!
//! Rejected events and publish failures are logged and never surface to the
//! originating device or client.

use std::sync::Arc;

use centinela_kernel::{Evaluation, SecurityGate};
use centinela_middleware::{InboundPublish, PubSubBroker};
use centinela_types::{
    AlarmState, CentinelaError, Event, OutboundMessage, SecurityMode, Snapshot,
    normalize_literal, topics,
};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Depth of the command queue between ingress adapters and the loop.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Startup options for the [`Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Arming mode at process start.
    pub initial_mode: SecurityMode,
    /// Publish the retained security and alarm status once at startup.
    pub announce_on_start: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            initial_mode: SecurityMode::Disarmed,
            announce_on_start: true,
        }
    }
}

struct Command {
    event: Event,
    reply: oneshot::Sender<Result<Evaluation, CentinelaError>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge (event loop)
// ─────────────────────────────────────────────────────────────────────────────

/// Single owner of the security state. Run it with [`Bridge::run`].
pub struct Bridge<B: PubSubBroker> {
    gate: Arc<SecurityGate>,
    broker: Arc<B>,
    commands: mpsc::Receiver<Command>,
    announce_on_start: bool,
}

impl<B: PubSubBroker + 'static> Bridge<B> {
    /// Create the loop and the handle ingress adapters use to reach it.
    pub fn new(broker: Arc<B>, config: BridgeConfig) -> (Self, BridgeHandle) {
        let gate = Arc::new(SecurityGate::new(config.initial_mode));
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let bridge = Self {
            gate: Arc::clone(&gate),
            broker,
            commands: rx,
            announce_on_start: config.announce_on_start,
        };
        let handle = BridgeHandle { commands: tx, gate };
        (bridge, handle)
    }

    /// Process commands until every [`BridgeHandle`] has been dropped.
    pub async fn run(mut self) {
        if self.announce_on_start {
            self.announce();
        }
        while let Some(Command { event, reply }) = self.commands.recv().await {
            let result = self.apply(&event);
            // The caller may have given up waiting; the event still counts.
            let _ = reply.send(result);
        }
        debug!("bridge loop stopped: all handles dropped");
    }

    fn apply(&self, event: &Event) -> Result<Evaluation, CentinelaError> {
        match self.gate.process(event) {
            Ok(evaluation) => {
                self.publish_outbox(&evaluation.outbox);
                Ok(evaluation)
            }
            Err(e) => {
                warn!(event = ?event, error = %e, "event rejected");
                Err(e)
            }
        }
    }

    fn publish_outbox(&self, outbox: &[OutboundMessage]) {
        for message in outbox {
            match self.broker.publish(&message.topic, &message.payload, message.retain) {
                Ok(receivers) => debug!(
                    topic = %message.topic,
                    payload = %message.payload,
                    receivers,
                    "published"
                ),
                Err(e) => error!(topic = %message.topic, error = %e, "publish failed"),
            }
        }
    }

    fn announce(&self) {
        let snapshot = self.gate.snapshot();
        info!(
            security = snapshot.security.payload(),
            alarm = snapshot.alarm.payload(),
            "announcing initial state"
        );
        self.publish_outbox(&[
            OutboundMessage::retained(topics::SECURITY_STATUS, snapshot.security.payload()),
            OutboundMessage::retained(topics::ALARM_STATUS, snapshot.alarm.payload()),
        ]);
    }
}

/// Start the bridge loop and its pub/sub ingress task on the current Tokio
/// runtime and return the handle for polling adapters.
pub fn spawn<B: PubSubBroker + 'static>(broker: Arc<B>, config: BridgeConfig) -> BridgeHandle {
    // Subscribe before the loop can publish anything.
    let inbound = broker.inbound();
    let (bridge, handle) = Bridge::new(broker, config);
    tokio::spawn(bridge.run());
    tokio::spawn(run_pubsub_ingress(handle.clone(), inbound));
    handle
}

// ─────────────────────────────────────────────────────────────────────────────
// BridgeHandle (ingress side)
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable entry point into the bridge loop.
#[derive(Clone)]
pub struct BridgeHandle {
    commands: mpsc::Sender<Command>,
    gate: Arc<SecurityGate>,
}

impl BridgeHandle {
    /// Submit `event` and wait for the loop to evaluate it.
    ///
    /// # Errors
    ///
    /// - [`CentinelaError::Channel`] – the loop is no longer running.
    /// - Any rejection returned by the policy engine.
    pub async fn submit(&self, event: Event) -> Result<Evaluation, CentinelaError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command { event, reply })
            .await
            .map_err(|_| CentinelaError::Channel("bridge loop is not running".to_string()))?;
        response
            .await
            .map_err(|_| CentinelaError::Channel("bridge loop dropped the reply".to_string()))?
    }

    /// Polling ingress for `POST /api/{device}`.
    ///
    /// The body is stripped of quotes, trimmed and upper-cased; the device
    /// name is lower-cased. Always returns the fixed acknowledgement.
    pub async fn report_sensor(&self, device: &str, body: &str) -> &'static str {
        let device = device.trim().to_lowercase();
        let reading = normalize_literal(body);
        info!(device = %device, reading = %reading, "device report received");

        let event = Event::SensorReport {
            sensor: device,
            reading,
        };
        match self.submit(event).await {
            Ok(evaluation) if evaluation.alarm().is_sounding() => {
                debug!("alarm sounding after report");
            }
            Ok(_) => {}
            // Already logged by the loop.
            Err(CentinelaError::UnrecognizedSensor(_) | CentinelaError::InvalidPayload { .. }) => {}
            Err(e) => error!(error = %e, "device report not processed"),
        }
        topics::DEVICE_ACK
    }

    /// Polling egress for `GET /api/alarma`.
    ///
    /// Falls back to reading the store directly if the loop is unavailable,
    /// so a device is never left without an answer.
    pub async fn alarm_status(&self) -> AlarmState {
        match self.submit(Event::AlarmStatusQuery).await {
            Ok(evaluation) => evaluation.alarm(),
            Err(e) => {
                error!(error = %e, "alarm status query failed; answering from store");
                self.gate.snapshot().alarm
            }
        }
    }

    /// Consistent copy of the current state, read without a loop round trip.
    pub fn snapshot(&self) -> Snapshot {
        self.gate.snapshot()
    }

    /// Pub/sub ingress for one inbound publish.
    ///
    /// Messages the bridge published itself are dropped here; without this
    /// check every retained status echo would re-enter the control path.
    /// Publishes outside [`topics::CONTROL_TOPICS`] are ignored.
    pub async fn handle_inbound(&self, message: InboundPublish) {
        if !message.external || !topics::CONTROL_TOPICS.contains(&message.topic.as_str()) {
            return;
        }
        match decode_control(&message.topic, &message.payload) {
            Ok(Some(event)) => {
                info!(topic = %message.topic, payload = %message.payload, "control command received");
                if let Err(e) = self.submit(event).await {
                    error!(topic = %message.topic, error = %e, "control command not processed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(topic = %message.topic, error = %e, "control command ignored"),
        }
    }
}

/// Map a publish on a control topic to a policy [`Event`].
///
/// Returns `Ok(None)` for topics the bridge does not listen on.
///
/// The payload is only trimmed, then compared exactly: a dashboard sending
/// `activar` disarms, as does an empty payload. Sensor readings are
/// normalized more leniently by [`BridgeHandle::report_sensor`] because
/// devices send whatever their firmware produces.
///
/// | Topic | Payload | Event |
/// |---|---|---|
/// | `sistema/control/seguridad` | `ACTIVAR` | `SecurityCommand { enable: true }` |
/// | `sistema/control/seguridad` | anything else | `SecurityCommand { enable: false }` |
/// | `sistema/control/alarma` | `APAGAR` | `AlarmSilenceCommand` |
///
/// # Errors
///
/// [`CentinelaError::InvalidPayload`] for an alarm command other than
/// `APAGAR`.
pub fn decode_control(topic: &str, payload: &str) -> Result<Option<Event>, CentinelaError> {
    let literal = payload.trim();
    match topic {
        topics::SECURITY_CONTROL => Ok(Some(Event::SecurityCommand {
            enable: literal == topics::ARM_COMMAND,
        })),
        topics::ALARM_CONTROL if literal == topics::SILENCE_COMMAND => {
            Ok(Some(Event::AlarmSilenceCommand))
        }
        topics::ALARM_CONTROL => Err(CentinelaError::InvalidPayload {
            context: topic.to_string(),
            payload: payload.to_string(),
        }),
        _ => Ok(None),
    }
}

/// Drive [`BridgeHandle::handle_inbound`] from a broker's inbound stream.
///
/// Messages are handled one at a time, in arrival order.
pub async fn run_pubsub_ingress(handle: BridgeHandle, mut inbound: BoxStream<'static, InboundPublish>) {
    while let Some(message) = inbound.next().await {
        handle.handle_inbound(message).await;
    }
    debug!("pub/sub ingress stopped: broker stream closed");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use centinela_middleware::{Origin, RetainedBus};
    use centinela_types::{Position, SensorId};
    use std::time::Duration;
    use uuid::Uuid;

    fn start(initial_mode: SecurityMode) -> (Arc<RetainedBus>, BridgeHandle) {
        let bus = Arc::new(RetainedBus::default());
        let handle = spawn(
            Arc::clone(&bus),
            BridgeConfig {
                initial_mode,
                announce_on_start: false,
            },
        );
        (bus, handle)
    }

    fn client_publish(bus: &RetainedBus, topic: &str, payload: &str) {
        bus.publish(topic, payload, false, Origin::Client(Uuid::new_v4()))
            .unwrap();
    }

    async fn wait_until(handle: &BridgeHandle, cond: impl Fn(&Snapshot) -> bool) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while !cond(&handle.snapshot()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "condition not reached: {:?}", handle.snapshot());
    }

    #[tokio::test]
    async fn arm_then_open_door_sounds_alarm() {
        let (bus, handle) = start(SecurityMode::Disarmed);

        handle.submit(Event::SecurityCommand { enable: true }).await.unwrap();
        let ack = handle.report_sensor("puerta", "ABIERTA").await;

        assert_eq!(ack, "ok");
        assert_eq!(bus.retained(topics::ALARM_STATUS).as_deref(), Some("ON"));
        assert_eq!(bus.retained(topics::DOOR_STATE).as_deref(), Some("ABIERTA"));
        assert_eq!(handle.alarm_status().await.payload(), "ON");
    }

    #[tokio::test]
    async fn silence_publishes_off_and_keeps_armed() {
        let (bus, handle) = start(SecurityMode::Armed);
        handle.report_sensor("ventana", "ABIERTA").await;

        handle.submit(Event::AlarmSilenceCommand).await.unwrap();

        assert_eq!(bus.retained(topics::ALARM_STATUS).as_deref(), Some("OFF"));
        assert_eq!(handle.alarm_status().await, AlarmState::Silent);
        assert_eq!(handle.snapshot().security, SecurityMode::Armed);
    }

    #[tokio::test]
    async fn unrecognized_reading_changes_nothing() {
        let (bus, handle) = start(SecurityMode::Armed);
        let before = handle.snapshot();

        let ack = handle.report_sensor("puerta", "quizás").await;

        assert_eq!(ack, "ok");
        assert_eq!(handle.snapshot(), before);
        assert!(bus.retained_matching("#").is_empty());
        assert_eq!(handle.alarm_status().await, AlarmState::Silent);
    }

    #[tokio::test]
    async fn unknown_device_is_acknowledged_and_ignored() {
        let (bus, handle) = start(SecurityMode::Armed);

        let ack = handle.report_sensor("garaje", "ABIERTA").await;

        assert_eq!(ack, "ok");
        assert!(bus.retained_matching("#").is_empty());
        assert_eq!(handle.snapshot().alarm, AlarmState::Silent);
    }

    #[tokio::test]
    async fn report_body_is_normalized() {
        let (bus, handle) = start(SecurityMode::Disarmed);

        handle.report_sensor("VENTANA", "  \"cerrada\"\r\n").await;

        assert_eq!(bus.retained(topics::WINDOW_STATE).as_deref(), Some("CERRADA"));
        assert_eq!(handle.snapshot().sensor(SensorId::Window).position, Position::Closed);
    }

    #[tokio::test]
    async fn disarm_while_sounding_keeps_alarm_on() {
        let (bus, handle) = start(SecurityMode::Armed);
        handle.report_sensor("puerta", "ABIERTA").await;

        handle.submit(Event::SecurityCommand { enable: false }).await.unwrap();

        assert_eq!(bus.retained(topics::SECURITY_STATUS).as_deref(), Some("DESACTIVADO"));
        assert_eq!(bus.retained(topics::ALARM_STATUS).as_deref(), Some("ON"));
        assert_eq!(handle.alarm_status().await, AlarmState::Sounding);
    }

    #[tokio::test]
    async fn external_arm_command_is_applied() {
        let (bus, handle) = start(SecurityMode::Disarmed);

        client_publish(&bus, topics::SECURITY_CONTROL, "ACTIVAR");

        wait_until(&handle, |s| s.security.is_armed()).await;
        assert_eq!(bus.retained(topics::SECURITY_STATUS).as_deref(), Some("ACTIVADO"));
    }

    #[tokio::test]
    async fn external_silence_command_is_applied() {
        let (bus, handle) = start(SecurityMode::Armed);
        handle.report_sensor("puerta", "ABIERTA").await;

        client_publish(&bus, topics::ALARM_CONTROL, "APAGAR");

        wait_until(&handle, |s| !s.alarm.is_sounding()).await;
        assert_eq!(bus.retained(topics::ALARM_STATUS).as_deref(), Some("OFF"));
    }

    #[tokio::test]
    async fn self_published_control_messages_are_ignored() {
        let (bus, handle) = start(SecurityMode::Disarmed);

        // Same topic and payload as a dashboard would send, but bridge origin.
        bus.publish(topics::SECURITY_CONTROL, "ACTIVAR", false, Origin::Bridge)
            .unwrap();
        // A later external message proves the ingress task has caught up.
        client_publish(&bus, topics::ALARM_CONTROL, "APAGAR");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.snapshot().security, SecurityMode::Disarmed);
        assert!(bus.retained(topics::SECURITY_STATUS).is_none());
    }

    /// Broker whose every publish fails; inbound comes from a real bus.
    struct OfflineBroker {
        bus: RetainedBus,
    }

    impl PubSubBroker for OfflineBroker {
        fn publish(&self, _: &str, _: &str, _: bool) -> Result<usize, CentinelaError> {
            Err(CentinelaError::PublishFailure("broker offline".to_string()))
        }

        fn inbound(&self) -> BoxStream<'static, InboundPublish> {
            self.bus.inbound()
        }
    }

    #[tokio::test]
    async fn publish_failure_keeps_state_and_device_answers() {
        let broker = Arc::new(OfflineBroker {
            bus: RetainedBus::default(),
        });
        let handle = spawn(
            Arc::clone(&broker),
            BridgeConfig {
                initial_mode: SecurityMode::Armed,
                announce_on_start: true,
            },
        );

        let ack = handle.report_sensor("puerta", "ABIERTA").await;

        assert_eq!(ack, "ok");
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.alarm, AlarmState::Sounding);
        assert_eq!(snapshot.sensor(SensorId::Door).position, Position::Open);
        assert_eq!(handle.alarm_status().await.payload(), "ON");

        handle.submit(Event::AlarmSilenceCommand).await.unwrap();
        assert_eq!(handle.alarm_status().await.payload(), "OFF");
        assert!(broker.bus.retained_matching("#").is_empty());
    }

    #[tokio::test]
    async fn external_publish_on_status_topic_is_ignored() {
        let (bus, handle) = start(SecurityMode::Armed);
        handle.report_sensor("puerta", "ABIERTA").await;

        // A client writing a status topic must not reach the engine.
        client_publish(&bus, topics::ALARM_STATUS, "APAGAR");
        client_publish(&bus, topics::SECURITY_CONTROL, "DESACTIVAR");

        wait_until(&handle, |s| !s.security.is_armed()).await;
        assert_eq!(handle.snapshot().alarm, AlarmState::Sounding);
    }

    #[tokio::test]
    async fn announce_publishes_initial_state() {
        let bus = Arc::new(RetainedBus::default());
        let handle = spawn(
            Arc::clone(&bus),
            BridgeConfig {
                initial_mode: SecurityMode::Armed,
                announce_on_start: true,
            },
        );
        // Any round trip guarantees the loop has started.
        handle.alarm_status().await;

        assert_eq!(bus.retained(topics::SECURITY_STATUS).as_deref(), Some("ACTIVADO"));
        assert_eq!(bus.retained(topics::ALARM_STATUS).as_deref(), Some("OFF"));
    }

    #[test]
    fn decode_security_commands() {
        assert_eq!(
            decode_control(topics::SECURITY_CONTROL, " ACTIVAR "),
            Ok(Some(Event::SecurityCommand { enable: true }))
        );
        for other in ["DESACTIVAR", "activar", "", "   "] {
            assert_eq!(
                decode_control(topics::SECURITY_CONTROL, other),
                Ok(Some(Event::SecurityCommand { enable: false })),
                "{other:?}"
            );
        }
    }

    #[test]
    fn decode_alarm_commands() {
        assert_eq!(
            decode_control(topics::ALARM_CONTROL, "APAGAR\n"),
            Ok(Some(Event::AlarmSilenceCommand))
        );
        for other in ["apagar", "ENCENDER", ""] {
            assert!(matches!(
                decode_control(topics::ALARM_CONTROL, other),
                Err(CentinelaError::InvalidPayload { .. })
            ));
        }
    }

    #[test]
    fn decode_ignores_other_topics() {
        assert_eq!(decode_control(topics::ALARM_STATUS, "ON"), Ok(None));
        assert_eq!(decode_control("casa/puertas", "ABIERTA"), Ok(None));
    }
}
