//! JSON-over-WebSocket pub/sub endpoint for dashboards.
//!
//! [`WsGateway`] gives browser clients a minimal pub/sub session on the
//! [`RetainedBus`]. Frames are JSON text:
//!
//! | Direction | Frame |
//! |---|---|
//! | client → server | `{"op":"subscribe","topic":"<filter>"}` |
//! | client → server | `{"op":"unsubscribe","topic":"<filter>"}` |
//! | client → server | `{"op":"publish","topic":"…","payload":"…","retain":false}` |
//! | server → client | `{"op":"message","topic":"…","payload":"…","retain":true}` |
//!
//! The gateway is independent of the WebSocket implementation: the server
//! hands [`WsGateway::serve_session`] the text frames it receives and a sink
//! for the frames to send.
//!
//! Subscribing immediately replays every retained message matching the
//! filter, so a dashboard opened after the fact shows current state at once.
//! Publishes are tagged [`Origin::Client`] with the connection's id.

use std::fmt::Display;
use std::pin::pin;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{BusMessage, Origin, RetainedBus, topic_matches};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum ClientFrame {
    Subscribe {
        topic: String,
    },
    Unsubscribe {
        topic: String,
    },
    Publish {
        topic: String,
        #[serde(default)]
        payload: String,
        #[serde(default)]
        retain: bool,
    },
}

/// Per-connection subscription state.
#[derive(Debug)]
pub(crate) struct ClientSession {
    id: Uuid,
    filters: Vec<String>,
}

impl ClientSession {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            filters: Vec::new(),
        }
    }

    fn wants(&self, topic: &str) -> bool {
        self.filters.iter().any(|f| topic_matches(f, topic))
    }
}

#[derive(Clone)]
pub struct WsGateway {
    bus: RetainedBus,
}

impl WsGateway {
    pub fn new(bus: RetainedBus) -> Self {
        Self { bus }
    }

    /// Run one client session until `incoming` ends, a send fails, or the
    /// bus closes.
    ///
    /// `incoming` yields the text frames received from the client; the
    /// WebSocket layer ends it on close. Frames for the client go to
    /// `outgoing`.
    pub async fn serve_session<Tx, Rx>(&self, outgoing: Tx, incoming: Rx, peer: &str)
    where
        Tx: Sink<String>,
        Tx::Error: Display,
        Rx: Stream<Item = String>,
    {
        let mut outgoing = pin!(outgoing);
        let mut incoming = pin!(incoming);
        let mut bus_rx = self.bus.subscribe();
        let mut session = ClientSession::new();
        info!(peer, client = %session.id, "dashboard connected");

        'session: loop {
            tokio::select! {
                // Bus → client, filtered by the session's subscriptions.
                result = bus_rx.recv() => {
                    match result {
                        Ok(message) if session.wants(&message.topic) => {
                            if let Err(e) = outgoing.send(encode(&message)).await {
                                debug!(peer, error = %e, "ws send failed");
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(peer, lagged_by = n, "ws client lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                // Client → bus.
                text = incoming.next() => {
                    let Some(text) = text else { break };
                    for frame in self.handle_client_frame(&mut session, &text) {
                        if let Err(e) = outgoing.send(frame).await {
                            debug!(peer, error = %e, "ws send failed");
                            break 'session;
                        }
                    }
                }
            }
        }

        info!(peer, client = %session.id, "dashboard disconnected");
    }

    /// Apply one client frame and return the frames to send straight back
    /// (retained replays after a subscribe).
    ///
    /// Malformed or unknown frames are ignored.
    pub(crate) fn handle_client_frame(&self, session: &mut ClientSession, text: &str) -> Vec<String> {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(client = %session.id, error = %e, "ignoring malformed ws frame");
                return Vec::new();
            }
        };

        match frame {
            ClientFrame::Subscribe { topic } => {
                let replay = self
                    .bus
                    .retained_matching(&topic)
                    .iter()
                    .map(encode)
                    .collect();
                if !session.filters.contains(&topic) {
                    session.filters.push(topic);
                }
                replay
            }
            ClientFrame::Unsubscribe { topic } => {
                session.filters.retain(|f| f != &topic);
                Vec::new()
            }
            ClientFrame::Publish { topic, payload, retain } => {
                if let Err(e) = self.bus.publish(&topic, &payload, retain, Origin::Client(session.id)) {
                    warn!(client = %session.id, topic = %topic, error = %e, "client publish rejected");
                }
                Vec::new()
            }
        }
    }
}

fn encode(message: &BusMessage) -> String {
    json!({
        "op": "message",
        "topic": message.topic,
        "payload": message.payload,
        "retain": message.retain,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn gateway() -> (RetainedBus, WsGateway) {
        let bus = RetainedBus::default();
        (bus.clone(), WsGateway::new(bus))
    }

    #[test]
    fn subscribe_replays_matching_retained_messages() {
        let (bus, gw) = gateway();
        bus.publish("sistema/estado/alarma", "ON", true, Origin::Bridge).unwrap();
        bus.publish("casa/puertas", "ABIERTA", true, Origin::Bridge).unwrap();

        let mut session = ClientSession::new();
        let frames = gw.handle_client_frame(&mut session, r#"{"op":"subscribe","topic":"sistema/#"}"#);

        assert_eq!(frames.len(), 1);
        let frame: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(frame["op"], "message");
        assert_eq!(frame["topic"], "sistema/estado/alarma");
        assert_eq!(frame["payload"], "ON");
        assert_eq!(frame["retain"], true);
        assert!(session.wants("sistema/estado/seguridad"));
        assert!(!session.wants("casa/puertas"));
    }

    #[test]
    fn duplicate_subscribe_is_recorded_once() {
        let (_bus, gw) = gateway();
        let mut session = ClientSession::new();
        gw.handle_client_frame(&mut session, r#"{"op":"subscribe","topic":"casa/+"}"#);
        gw.handle_client_frame(&mut session, r#"{"op":"subscribe","topic":"casa/+"}"#);
        assert_eq!(session.filters.len(), 1);
    }

    #[test]
    fn unsubscribe_removes_filter() {
        let (_bus, gw) = gateway();
        let mut session = ClientSession::new();
        gw.handle_client_frame(&mut session, r#"{"op":"subscribe","topic":"casa/+"}"#);
        gw.handle_client_frame(&mut session, r#"{"op":"unsubscribe","topic":"casa/+"}"#);
        assert!(!session.wants("casa/puertas"));
    }

    #[tokio::test]
    async fn publish_is_tagged_with_client_origin() {
        let (bus, gw) = gateway();
        let mut rx = bus.subscribe();
        let mut session = ClientSession::new();

        gw.handle_client_frame(
            &mut session,
            r#"{"op":"publish","topic":"sistema/control/seguridad","payload":"ACTIVAR"}"#,
        );

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, "sistema/control/seguridad");
        assert_eq!(msg.payload, "ACTIVAR");
        assert!(!msg.retain);
        assert_eq!(msg.origin, Origin::Client(session.id));
    }

    #[test]
    fn malformed_frames_are_ignored() {
        let (bus, gw) = gateway();
        let mut rx = bus.subscribe();
        let mut session = ClientSession::new();

        assert!(gw.handle_client_frame(&mut session, "not json at all").is_empty());
        assert!(gw.handle_client_frame(&mut session, r#"{"op":"connect"}"#).is_empty());
        assert!(session.filters.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn session_replays_retained_state_then_ends_with_input() {
        let (bus, gw) = gateway();
        bus.publish("sistema/estado/seguridad", "ACTIVADO", true, Origin::Bridge).unwrap();

        let incoming = futures_util::stream::iter(vec![
            r#"{"op":"subscribe","topic":"sistema/estado/+"}"#.to_string(),
        ]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let outgoing = futures_util::sink::unfold(tx, |tx, frame: String| async move {
            tx.send(frame).map(|()| tx)
        });
        gw.serve_session(outgoing, incoming, "test").await;

        let sent = rx.recv().await.expect("replayed frame");
        assert!(rx.try_recv().is_err(), "only one retained topic matches");
        let frame: Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(frame["topic"], "sistema/estado/seguridad");
        assert_eq!(frame["payload"], "ACTIVADO");
    }

    #[test]
    fn publish_to_wildcard_topic_is_dropped() {
        let (bus, gw) = gateway();
        let mut session = ClientSession::new();
        gw.handle_client_frame(
            &mut session,
            r##"{"op":"publish","topic":"sistema/#","payload":"x","retain":true}"##,
        );
        assert!(bus.retained_matching("#").is_empty());
    }
}
