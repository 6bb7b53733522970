//! `centinela-server` – the device-facing polling surface.
//!
//! Boots a lightweight HTTP + WebSocket server (default port `8888`) that:
//!
//! 1. **Answers** constrained devices over plain HTTP/1.1:
//!    - `GET /api/alarma` → `ON` / `OFF`, plain text, no framing.
//!    - `POST /api/{device}` → forwards the body to the bridge as a sensor
//!      report and always answers `ok`.
//!    - `GET /api/estado` → JSON snapshot of the whole state.
//!
//! 2. **Upgrades** WebSocket requests on the same port to the JSON pub/sub
//!    gateway, so dashboards share the bus with the bridge.
//!
//! 3. **Serves** the embedded dashboard page at `/`.
//!
//! Routing, body decoding (including chunked bodies) and the WebSocket
//! handshake are axum's; [`router`] exposes the route table for tests.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use centinela_middleware::RetainedBus;
//! use centinela_runtime::{BridgeConfig, spawn};
//! use centinela_server::CentinelaServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = Arc::new(RetainedBus::default());
//!     let handle = spawn(Arc::clone(&bus), BridgeConfig::default());
//!     CentinelaServer::new(handle, (*bus).clone())
//!         .run()
//!         .await
//!         .expect("server failed");
//! }
//! ```

pub mod server;

pub use server::{CentinelaServer, DEFAULT_PORT, router};
