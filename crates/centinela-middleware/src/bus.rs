//! Headless topic bus with retained messages.
//!
//! Uses [`tokio::sync::broadcast`] under the hood so that every subscriber
//! receives every message without any single subscriber blocking the others.
//! Subscribers filter by MQTT-style topic filters (see [`topic_matches`]).
//!
//! A message published with `retain = true` is also stored per topic, so a
//! client that subscribes later can be handed the current value immediately
//! via [`RetainedBus::retained_matching`]. Publishing an empty retained
//! payload clears the stored value.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use centinela_types::CentinelaError;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default channel capacity (number of buffered messages before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Who put a message on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The policy bridge itself.
    Bridge,
    /// An external client connection.
    Client(Uuid),
}

impl Origin {
    pub fn is_external(self) -> bool {
        matches!(self, Origin::Client(_))
    }
}

/// A single publish as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub payload: String,
    pub retain: bool,
    pub origin: Origin,
}

/// Shared topic bus. Clone it cheaply – all clones share the same channel and
/// retained store.
#[derive(Clone, Debug)]
pub struct RetainedBus {
    sender: broadcast::Sender<BusMessage>,
    retained: Arc<RwLock<HashMap<String, BusMessage>>>,
}

impl RetainedBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// A capacity of zero is raised to one; a broadcast channel needs room
    /// for at least one message.
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            warn!("bus capacity 0 is not usable; using 1");
        }
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            retained: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish `payload` on `topic`.
    ///
    /// Returns the number of live receivers handed the message. `Ok(0)` is a
    /// normal condition: a retained message is still stored for later
    /// subscribers.
    ///
    /// # Errors
    ///
    /// [`CentinelaError::PublishFailure`] when `topic` is empty or contains a
    /// wildcard (`+`, `#`), which are only valid in filters.
    pub fn publish(
        &self,
        topic: &str,
        payload: &str,
        retain: bool,
        origin: Origin,
    ) -> Result<usize, CentinelaError> {
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(CentinelaError::PublishFailure(format!(
                "invalid topic name {topic:?}"
            )));
        }

        let message = BusMessage {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
            origin,
        };

        if retain {
            let mut store = self.retained.write().unwrap_or_else(PoisonError::into_inner);
            if payload.is_empty() {
                store.remove(topic);
            } else {
                store.insert(topic.to_string(), message.clone());
            }
        }

        match self.sender.send(message) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => {
                debug!(topic, "published with no live subscribers");
                Ok(0)
            }
        }
    }

    /// Subscribe to every message on the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    /// Retained messages whose topic matches `filter`, sorted by topic.
    pub fn retained_matching(&self, filter: &str) -> Vec<BusMessage> {
        let store = self.retained.read().unwrap_or_else(PoisonError::into_inner);
        let mut matches: Vec<BusMessage> = store
            .values()
            .filter(|m| topic_matches(filter, &m.topic))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.topic.cmp(&b.topic));
        matches
    }

    /// The retained payload for an exact topic, if any.
    pub fn retained(&self, topic: &str) -> Option<String> {
        self.retained
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map(|m| m.payload.clone())
    }
}

impl Default for RetainedBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// MQTT-style topic filter matching.
///
/// `+` matches exactly one level, a trailing `#` matches the parent level and
/// any number of further levels. Everything else matches literally.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
