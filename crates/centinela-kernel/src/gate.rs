//! [`SecurityGate`] – the one path through which events reach the state.
//!
//! Each call to [`SecurityGate::process`] runs the [`PolicyEngine`] inside
//! [`StateStore::update`], so the read of the current state, the mutation and
//! the outbox construction happen under a single write lock. Two events can
//! never interleave, whichever transport produced them.
//!
//! # Example
//!
//! ```
//! use centinela_kernel::SecurityGate;
//! use centinela_types::{AlarmState, Event, SecurityMode};
//!
//! let gate = SecurityGate::new(SecurityMode::Disarmed);
//! gate.process(&Event::SecurityCommand { enable: true }).unwrap();
//! let eval = gate
//!     .process(&Event::SensorReport { sensor: "puerta".into(), reading: "ABIERTA".into() })
//!     .unwrap();
//!
//! assert_eq!(eval.snapshot.alarm, AlarmState::Sounding);
//! assert_eq!(eval.outbox.len(), 2);
//! ```

use centinela_types::{AlarmState, CentinelaError, Event, OutboundMessage, SecurityMode, Snapshot};
use chrono::Utc;

use crate::policy::PolicyEngine;
use crate::state_store::StateStore;

/// Result of one accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// State immediately after the event was applied.
    pub snapshot: Snapshot,
    /// Retained messages to publish, in order.
    pub outbox: Vec<OutboundMessage>,
}

impl Evaluation {
    pub fn alarm(&self) -> AlarmState {
        self.snapshot.alarm
    }
}

pub struct SecurityGate {
    store: StateStore,
    engine: PolicyEngine,
}

impl SecurityGate {
    pub fn new(initial_mode: SecurityMode) -> Self {
        Self {
            store: StateStore::new(initial_mode),
            engine: PolicyEngine::new(),
        }
    }

    /// Evaluate `event` atomically against the store.
    ///
    /// # Errors
    ///
    /// Propagates the engine's rejection; the store is left unchanged.
    pub fn process(&self, event: &Event) -> Result<Evaluation, CentinelaError> {
        self.store.update(|state| {
            let mut next = state.clone();
            let outbox = self.engine.evaluate(event, &mut next, Utc::now())?;
            *state = next.clone();
            Ok(Evaluation {
                snapshot: next,
                outbox,
            })
        })
    }

    /// Current state without going through the engine.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use centinela_types::topics;
    use std::sync::Arc;
    use std::thread;

    fn report(sensor: &str, reading: &str) -> Event {
        Event::SensorReport {
            sensor: sensor.to_string(),
            reading: reading.to_string(),
        }
    }

    #[test]
    fn accepted_event_is_visible_to_readers() {
        let gate = SecurityGate::new(SecurityMode::Disarmed);
        let eval = gate.process(&Event::SecurityCommand { enable: true }).unwrap();

        assert_eq!(eval.snapshot.security, SecurityMode::Armed);
        assert_eq!(gate.snapshot(), eval.snapshot);
    }

    #[test]
    fn rejected_event_leaves_store_untouched() {
        let gate = SecurityGate::new(SecurityMode::Armed);
        let before = gate.snapshot();

        assert!(gate.process(&report("puerta", "quizás")).is_err());
        assert!(gate.process(&report("sotano", "ABIERTA")).is_err());
        assert_eq!(gate.snapshot(), before);
    }

    #[test]
    fn query_reports_current_alarm() {
        let gate = SecurityGate::new(SecurityMode::Armed);
        gate.process(&report("ventana", "ABIERTA")).unwrap();

        let eval = gate.process(&Event::AlarmStatusQuery).unwrap();
        assert_eq!(eval.alarm(), AlarmState::Sounding);
        assert!(eval.outbox.is_empty());
    }

    #[test]
    fn concurrent_events_are_serialized() {
        let gate = Arc::new(SecurityGate::new(SecurityMode::Armed));
        let mut handles = Vec::new();
        for i in 0..8 {
            let gate = Arc::clone(&gate);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let event = if i % 2 == 0 {
                        report("puerta", "ABIERTA")
                    } else {
                        Event::AlarmSilenceCommand
                    };
                    let eval = gate.process(&event).unwrap();
                    // An open report while armed always ends sounding, never
                    // half-applied by a concurrent silence.
                    if i % 2 == 0 {
                        assert_eq!(eval.alarm(), AlarmState::Sounding);
                        assert!(eval
                            .outbox
                            .iter()
                            .any(|m| m.topic == topics::ALARM_STATUS && m.payload == "ON"));
                    } else {
                        assert_eq!(eval.alarm(), AlarmState::Silent);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
