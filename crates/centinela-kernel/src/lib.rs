//! `centinela-kernel` – authoritative state and the fixed security policy.
//!
//! # Modules
//!
//! - [`state_store`] – [`StateStore`][state_store::StateStore]: the guarded
//!   in-memory record of sensor positions, arming mode and alarm state.
//!   Readers always observe a whole [`Snapshot`][centinela_types::Snapshot].
//! - [`policy`] – [`PolicyEngine`][policy::PolicyEngine]: pure decision logic
//!   mapping an [`Event`][centinela_types::Event] and the current state to the
//!   new state plus the retained bus messages to emit.
//! - [`gate`] – [`SecurityGate`][gate::SecurityGate]: the single evaluation
//!   path; runs the policy engine inside the store's write lock so that each
//!   event is fully applied before the next one starts.

pub mod gate;
pub mod policy;
pub mod state_store;

pub use gate::{Evaluation, SecurityGate};
pub use policy::PolicyEngine;
pub use state_store::StateStore;
