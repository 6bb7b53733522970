//! [`CentinelaServer`] – HTTP polling surface plus WebSocket upgrade.
//!
//! Listens on `0.0.0.0:8888` (configurable via [`CentinelaServer::with_port`]).
//!
//! | Route | Response |
//! |---|---|
//! | `GET /api/alarma` | `ON` / `OFF`, plain text |
//! | `GET /api/estado` | state snapshot, JSON |
//! | `POST /api/{device}` | `ok`, plain text, whatever the device |
//! | `GET /` with `Upgrade: websocket` | [`WsGateway`] pub/sub session |
//! | `GET /`, `GET /index.html` | dashboard page |
//!
//! API paths are matched case-insensitively and with or without a trailing
//! slash, since device firmware is not consistent about either.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        ConnectInfo, Path, Request, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use centinela_middleware::{RetainedBus, WsGateway};
use centinela_runtime::BridgeHandle;
use centinela_types::{CentinelaError, Snapshot};
use futures_util::{SinkExt, StreamExt, future};
use tokio::net::TcpListener;
use tracing::{Instrument, debug, info, info_span};

/// Default TCP port for the polling API and the WebSocket gateway.
pub const DEFAULT_PORT: u16 = 8888;

/// The compiled-in dashboard page.
const DASHBOARD_HTML: &str = include_str!("dashboard.html");

/// Path prefix of the device API.
const API_PREFIX: &str = "/api/";

pub struct CentinelaServer {
    bridge: BridgeHandle,
    gateway: WsGateway,
    port: u16,
}

impl CentinelaServer {
    /// Create a server on the [`DEFAULT_PORT`] answering from `bridge` and
    /// attaching dashboards to `bus`.
    pub fn new(bridge: BridgeHandle, bus: RetainedBus) -> Self {
        Self {
            bridge,
            gateway: WsGateway::new(bus),
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:{port}` and serve forever.
    ///
    /// # Errors
    ///
    /// Returns [`CentinelaError::Io`] if the TCP listener cannot bind.
    pub async fn run(self) -> Result<(), CentinelaError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CentinelaError::Io(format!("bind error on {addr}: {e}")))?;
        info!(port = self.port, "polling API listening on /api/puerta, /api/ventana, /api/alarma");
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), CentinelaError> {
        let app = build_router(self.bridge, self.gateway);
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| CentinelaError::Io(format!("server error: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    bridge: BridgeHandle,
    gateway: WsGateway,
}

/// The full route table, without a listener. Wrong methods on known routes
/// get 405 from axum; unknown paths go through [`fallback`].
pub fn router(bridge: BridgeHandle, bus: RetainedBus) -> Router {
    build_router(bridge, WsGateway::new(bus))
}

fn build_router(bridge: BridgeHandle, gateway: WsGateway) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/api/alarma", get(alarm_status))
        .route("/api/estado", get(snapshot))
        .route("/api/:device", post(report))
        .fallback(fallback)
        .layer(middleware::from_fn(trace_request))
        .with_state(AppState { bridge, gateway })
}

async fn trace_request(request: Request, next: Next) -> Response {
    let span = info_span!("request", method = %request.method(), path = %request.uri().path());
    async move {
        let response = next.run(request).await;
        debug!(status = response.status().as_u16(), "answered");
        response
    }
    .instrument(span)
    .await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(ws) = ws else {
        return Html(DASHBOARD_HTML).into_response();
    };
    let peer = peer.map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.to_string());
    ws.on_upgrade(move |socket| serve_socket(state.gateway, socket, peer))
        .into_response()
}

/// Adapt an axum [`WebSocket`] to the gateway's text-frame session.
async fn serve_socket(gateway: WsGateway, socket: WebSocket, peer: String) {
    let (sink, stream) = socket.split();
    let outgoing = sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));
    let incoming = stream
        .take_while(|frame| future::ready(!matches!(frame, Err(_) | Ok(Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(text),
                _ => None,
            })
        });
    gateway.serve_session(outgoing, incoming, &peer).await;
}

async fn alarm_status(State(state): State<AppState>) -> &'static str {
    state.bridge.alarm_status().await.payload()
}

async fn snapshot(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.bridge.snapshot())
}

async fn report(State(state): State<AppState>, Path(device): Path<String>, body: Bytes) -> &'static str {
    report_device(&state, &device, &body).await
}

async fn report_device(state: &AppState, device: &str, body: &[u8]) -> &'static str {
    state
        .bridge
        .report_sensor(device, &String::from_utf8_lossy(body))
        .await
}

/// Second chance for API paths written with a trailing slash or in another
/// case; everything else is 404.
async fn fallback(State(state): State<AppState>, method: Method, uri: Uri, body: Bytes) -> Response {
    let not_found = || (StatusCode::NOT_FOUND, "not found").into_response();

    let path = uri.path().trim_end_matches('/').to_ascii_lowercase();
    if path == uri.path() || !path.starts_with("/api") {
        return not_found();
    }

    match (method, path.as_str()) {
        (Method::GET, "/api/alarma") => alarm_status(State(state)).await.into_response(),
        (Method::GET, "/api/estado") => snapshot(State(state)).await.into_response(),
        (Method::POST, p) => match device_segment(p) {
            Some(device) => report_device(&state, device, &body).await.into_response(),
            None => not_found(),
        },
        _ => not_found(),
    }
}

/// `/api/{device}` → `device`, for a single non-empty path segment.
fn device_segment(path: &str) -> Option<&str> {
    let device = path.strip_prefix(API_PREFIX)?;
    (!device.is_empty() && !device.contains('/')).then_some(device)
}
