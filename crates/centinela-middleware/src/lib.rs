//! `centinela-middleware` – the pub/sub side of the bridge.
//!
//! Routes topic messages between the policy bridge and browser clients
//! without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – [`RetainedBus`]: in-process topic bus on Tokio broadcast
//!   channels with MQTT-style retained messages and wildcard filters.
//! - [`broker`] – [`PubSubBroker`]: the narrow contract the bridge needs from
//!   any pub/sub engine (`publish` plus an inbound stream carrying an explicit
//!   external-origin flag).
//! - [`ws_gateway`] – [`WsGateway`]: JSON-over-WebSocket pub/sub endpoint for
//!   dashboards.

pub mod broker;
pub mod bus;
pub mod ws_gateway;

pub use broker::{InboundPublish, PubSubBroker};
pub use bus::{BusMessage, Origin, RetainedBus, topic_matches};
pub use ws_gateway::WsGateway;
