//! `centinela-runtime` – the bridge between devices, dashboards and policy.
//!
//! # Modules
//!
//! - [`bridge`] – [`Bridge`][bridge::Bridge] and
//!   [`BridgeHandle`][bridge::BridgeHandle]: a single task owns the
//!   [`SecurityGate`] and evaluates events strictly one at a time. Polling
//!   handlers and the pub/sub subscription hand events to it through a
//!   cloneable handle; every outbox entry is published retained.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter. Set
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod bridge;
pub mod telemetry;

pub use bridge::{Bridge, BridgeConfig, BridgeHandle, decode_control, spawn};
pub use telemetry::{TracerProviderGuard, init_tracing};

// Re-exported so the server and CLI can name the gate without an explicit
// dependency on centinela-kernel.
pub use centinela_kernel::{Evaluation, SecurityGate};
