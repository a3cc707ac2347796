//! Connection handlers for Pulse server.
//!
//! Each WebSocket connection becomes a socket of the server's namespace.
//! Inbound `Event` frames are routed through the socket; route results come
//! back as `Ack` frames and emitted events as `Event` frames.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, MetricsLogger};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use pulse_protocol::{codec, Frame};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tenvis_pulse_routes::{
    setup_socket_route, token_auth, Ack, BoxError, Channel, Deferred, Handshake, Namespace,
    NamespaceConfig, RouteError, RouteExt, Socket,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

type WsSender = SplitSink<WebSocket, Message>;

/// Shared server state.
pub struct AppState {
    /// Connected sockets.
    pub namespace: Namespace,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let mut namespace = Namespace::with_config(NamespaceConfig {
            max_connections: config.limits.max_connections,
        });

        namespace.use_middleware(setup_socket_route::<Socket>);
        match &config.auth.token {
            Some(token) => {
                namespace.use_middleware(token_auth::<Socket>(token.clone()));
            }
            None => warn!("No auth token configured; connections stay unauthenticated"),
        }
        namespace.on_connection(|socket| {
            if let Err(e) = declare_routes(socket) {
                error!(connection = %socket.id(), error = %e, "Failed to declare routes");
            }
        });

        Self { namespace, config }
    }
}

/// Routes offered to every connection.
fn declare_routes(socket: &Arc<Socket>) -> Result<(), RouteError> {
    socket
        .route("echo")?
        .log(MetricsLogger::new())
        .process(|data: Value| data);

    socket
        .route("message")?
        .auth(json!({"isAuthenticated": true}))
        .validate(json!({"email": {"isEmail": true}}))
        .log(MetricsLogger::new())
        .process(|data: Value| {
            Deferred::new(async move {
                let email = data.get("email").cloned().unwrap_or(Value::Null);
                Ok::<_, BoxError>(json!({"received": true, "email": email}))
            })
        });

    Ok(())
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;

    info!("Pulse server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.namespace.stats().connection_count,
    }))
}

/// WebSocket upgrade handler.
///
/// The query string becomes the connection handshake.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, Handshake::new(query), state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(ws: WebSocket, handshake: Handshake, state: Arc<AppState>) {
    let (socket, mut outbound) = match state.namespace.connect(handshake) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "Connection refused");
            metrics::record_rejection("namespace");
            let _ = ws.close().await;
            return;
        }
    };
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = socket.id().to_string();

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = ws.split();

    let heartbeat = &state.config.heartbeat;
    let connected = Frame::connected(
        &connection_id,
        u32::try_from(heartbeat.interval_ms).unwrap_or(u32::MAX),
    );
    if send_frame(&mut sender, &connected).await.is_err() {
        error!(connection = %connection_id, "Failed to send Connected frame");
        let _ = state.namespace.disconnect(&connection_id);
        return;
    }

    // Ack frames produced by route tasks.
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<Frame>();

    let mut read_buffer = BytesMut::with_capacity(4096);
    let idle_timeout = Duration::from_millis(heartbeat.timeout_ms);
    let mut ticker = tokio::time::interval(Duration::from_millis(heartbeat.interval_ms.max(1)));
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            biased;

            Some(frame) = ack_rx.recv() => {
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }

            Some(out) = outbound.recv() => {
                let frame = Frame::event(out.event, out.payload);
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                let data = match msg {
                    Some(Ok(Message::Binary(data))) => data,
                    // Text is treated as binary
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Ping(data))) => {
                        last_seen = Instant::now();
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                        continue;
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                };

                let start = Instant::now();
                last_seen = start;
                metrics::record_frame(data.len(), "inbound");
                read_buffer.extend_from_slice(&data);

                if let Err(e) = drain_frames(&mut read_buffer, &socket, &ack_tx, &mut sender).await {
                    error!(connection = %connection_id, error = %e, "Frame handling error");
                    break;
                }

                metrics::record_latency(start.elapsed().as_secs_f64());
            }

            _ = ticker.tick() => {
                if last_seen.elapsed() > idle_timeout {
                    info!(connection = %connection_id, "Heartbeat timeout");
                    break;
                }
            }
        }
    }

    let _ = state.namespace.disconnect(&connection_id);
    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode and handle every complete frame in `buffer`.
async fn drain_frames(
    buffer: &mut BytesMut,
    socket: &Socket,
    acks: &mpsc::UnboundedSender<Frame>,
    sender: &mut WsSender,
) -> Result<()> {
    loop {
        match codec::decode_from(buffer) {
            Ok(Some(frame)) => handle_frame(frame, socket, acks, sender).await?,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(connection = %socket.id(), error = %e, "Dropping undecodable input");
                metrics::record_error("decode");
                buffer.clear();
                return Ok(());
            }
        }
    }
}

/// Handle a decoded frame.
async fn handle_frame(
    frame: Frame,
    socket: &Socket,
    acks: &mpsc::UnboundedSender<Frame>,
    sender: &mut WsSender,
) -> Result<()> {
    match frame {
        Frame::Event { id, event, payload } => {
            debug!(connection = %socket.id(), event = %event, "Event");

            let ack = id.map(|id| {
                let acks = acks.clone();
                Ack::new(move |res| {
                    let _ = acks.send(ack_frame(id, res));
                })
            });

            if socket.receive(&event, payload, ack.clone()).is_empty() {
                if let Some(ack) = ack {
                    ack.send(Err(RouteError::execution(format!(
                        "No route for event: {event}"
                    ))));
                }
            }
        }

        Frame::Ping { timestamp } => {
            send_frame(sender, &Frame::pong(timestamp)).await?;
        }

        Frame::Pong { .. } => {}

        other => {
            warn!(connection = %socket.id(), frame_type = ?other.frame_type(), "Unexpected frame type");
        }
    }

    Ok(())
}

/// Build the `Ack` frame answering request `id`.
fn ack_frame(id: u64, result: Result<Value, RouteError>) -> Frame {
    match result {
        Ok(value) => Frame::ack_ok(id, value),
        Err(e) => Frame::ack_err(id, e.to_body()),
    }
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut WsSender, frame: &Frame) -> Result<()> {
    let data = codec::encode(frame)?;
    metrics::record_frame(data.len(), "outbound");
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
