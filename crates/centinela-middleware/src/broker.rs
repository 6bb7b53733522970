//! The pub/sub collaborator contract.
//!
//! The bridge never talks to a transport directly. It needs exactly two
//! things from a pub/sub engine:
//!
//! * `publish(topic, payload, retain)` – egress of policy outcomes.
//! * an inbound stream of publishes, each tagged with whether it came from an
//!   external client. The bridge drops its own echoes by checking
//!   [`InboundPublish::external`], which is what keeps its retained status
//!   publishes from feeding back into the control path.

use centinela_types::CentinelaError;
use futures_util::stream::{self, BoxStream};
use tokio::sync::broadcast;
use tracing::warn;

use crate::bus::{BusMessage, Origin, RetainedBus};

/// A publish observed on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPublish {
    pub topic: String,
    pub payload: String,
    /// `false` when the bridge itself published the message.
    pub external: bool,
}

impl From<BusMessage> for InboundPublish {
    fn from(message: BusMessage) -> Self {
        Self {
            external: message.origin.is_external(),
            topic: message.topic,
            payload: message.payload,
        }
    }
}

/// Every pub/sub engine the bridge can sit on must implement this trait.
pub trait PubSubBroker: Send + Sync {
    /// Publish on behalf of the bridge.
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<usize, CentinelaError>;

    /// Live stream of every publish from the moment of the call on.
    fn inbound(&self) -> BoxStream<'static, InboundPublish>;
}

impl PubSubBroker for RetainedBus {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<usize, CentinelaError> {
        RetainedBus::publish(self, topic, payload, retain, Origin::Bridge)
    }

    fn inbound(&self) -> BoxStream<'static, InboundPublish> {
        let receiver = self.subscribe();
        Box::pin(stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((InboundPublish::from(message), receiver)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lagged_by = n, "broker inbound stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}
