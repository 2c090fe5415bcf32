use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use nao_core::events::SessionEvent;
use nao_core::ids::ClientId;
use nao_robot::RobotSession;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::client;
use crate::dispatcher::Dispatcher;
use crate::event_bridge;
use crate::handlers;
use crate::protocol::{self, Inbound, Outbound};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub max_send_queue: usize,
    /// How long a preempted client gets to close before the next one is
    /// installed anyway.
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8002,
            max_send_queue: 256,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    session: Arc<RobotSession>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
) -> Result<ServerHandle, std::io::Error> {
    let dispatcher = Arc::new(Dispatcher::new(
        session,
        config.max_send_queue,
        config.drain_timeout,
    ));

    let bridge_handle = event_bridge::create_bridge(Arc::clone(&dispatcher), events);

    // Inbound message channel
    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);
    let processor_handle = tokio::spawn(process_messages(msg_rx, Arc::clone(&dispatcher)));

    let app_state = AppState {
        dispatcher: Arc::clone(&dispatcher),
        message_tx: msg_tx,
    };
    let router = build_router(app_state);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "websocket server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "websocket server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        dispatcher,
        shutdown,
        server: server_handle,
        bridge: bridge_handle,
        processor: processor_handle,
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    bridge: tokio::task::JoinHandle<()>,
    processor: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Close the active client (disengaging the robot) and stop listening.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
        self.shutdown.cancel();
        if tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .is_err()
        {
            tracing::warn!("websocket server did not stop in time");
        }
        self.bridge.abort();
        self.processor.abort();
        tracing::info!("websocket server is shut down");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client, rx) = state.dispatcher.activate().await;

    client::handle_ws_connection(socket, Arc::clone(&client), rx, state.message_tx).await;
    client.mark_closed();

    if client.is_preempted() {
        tracing::debug!(client_id = %client.id, "preempted client closed");
    } else {
        tracing::info!(client_id = %client.id, "websocket closing from the client");
        state.dispatcher.release(&client.id).await;
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    status: &'static str,
    robot_ready: bool,
    fake_robot: bool,
    client_active: bool,
    connected_since: Option<String>,
    running_dances: Vec<String>,
    running_body_actions: Vec<String>,
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.dispatcher.session().status();
    let client = state.dispatcher.active_client();

    let report = HealthReport {
        status: if status.ready { "healthy" } else { "degraded" },
        robot_ready: status.ready,
        fake_robot: status.simulated,
        client_active: client.is_some(),
        connected_since: client.map(|c| c.connected_at.to_rfc3339()),
        running_dances: status.running_dances,
        running_body_actions: status.running_body_actions,
    };

    let http_status = if status.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (http_status, Json(report))
}

/// Route inbound frames. Each command runs in its own task so a slow robot
/// call never blocks the next message.
async fn process_messages(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    dispatcher: Arc<Dispatcher>,
) {
    while let Some((client_id, raw_message)) = rx.recv().await {
        if !dispatcher.is_active(&client_id) {
            tracing::debug!(client_id = %client_id, "ignoring message from inactive client");
            continue;
        }

        let request = match protocol::parse_inbound(&raw_message) {
            Ok(Inbound::Command(request)) => request,
            Ok(Inbound::Other(id)) => {
                tracing::error!(message_id = %id, "unknown message id");
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "dropping inbound message");
                continue;
            }
        };

        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let response = handlers::dispatch(dispatcher.session(), &request).await;
            if let Some(json) = Outbound::CommandEnded(response).to_json() {
                if !dispatcher.send_to(&client_id, json) {
                    tracing::debug!(client_id = %client_id, command_uuid = %request.command_uuid, "response dropped, client no longer active");
                }
            }
        });
    }
}
