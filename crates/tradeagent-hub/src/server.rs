//! HTTP server implementation using axum.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::registry::{ConnectionInfo, ConnectionRegistry};

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct HubState {
    registry: Arc<ConnectionRegistry>,
    config: Arc<HubConfig>,
}

impl HubState {
    pub fn new(config: HubConfig) -> Self {
        Self::with_registry(config, Arc::new(ConnectionRegistry::new()))
    }

    pub fn with_registry(config: HubConfig, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    users: usize,
    total: usize,
    connections: Vec<ConnectionInfo>,
}

impl HealthResponse {
    fn from_registry(registry: &ConnectionRegistry) -> Self {
        Self {
            status: "ok",
            users: registry.user_count(),
            total: registry.total_connections(),
            connections: registry.connections(),
        }
    }
}

/// Create the axum router.
pub fn create_router(state: HubState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/{user_id}", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<HubState>) -> Json<HealthResponse> {
    Json(HealthResponse::from_registry(&state.registry))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    State(state): State<HubState>,
    Path(user_id): Path<String>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, params.token, state))
        .into_response()
}

/// Reply sent for every inbound text frame.
pub fn echo_reply(text: &str, user_id: &str) -> String {
    format!("Message text was: {text}, from user {user_id}")
}

async fn handle_socket(socket: WebSocket, user_id: String, token: Option<String>, state: HubState) {
    if !state.config.authorize(token.as_deref()) {
        warn!(user = %user_id, "Rejecting WebSocket with invalid token");
        reject(socket, close_code::POLICY, "invalid token").await;
        return;
    }

    let Some((id, mut outbound)) = state
        .registry
        .try_register(&user_id, state.config.max_connections_per_user)
    else {
        reject(socket, close_code::AGAIN, "too many connections").await;
        return;
    };

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    debug!(user = %user_id, text = %text.as_str(), "Received message");
                    let reply = echo_reply(text.as_str(), &user_id);
                    if sender.send(Message::Text(reply.into())).await.is_err() {
                        debug!(user = %user_id, "Failed to send reply, client disconnected");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(user = %user_id, "Client closed connection");
                    break;
                }
                Some(Err(e)) => {
                    debug!(user = %user_id, error = %e, "WebSocket receive error");
                    break;
                }
                // pings are answered by axum
                Some(Ok(_)) => {}
            },

            queued = outbound.recv() => match queued {
                Some(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        debug!(user = %user_id, "Failed to push message, client disconnected");
                        break;
                    }
                }
                None => break,
            },
        }
    }

    state.registry.unregister(&user_id, id);
}

async fn reject(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}

/// Serve the hub on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: HubState, shutdown: F) -> HubResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind `config.bind_addr` and run the hub until `shutdown` resolves.
pub async fn run_server<F>(state: HubState, shutdown: F) -> HubResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = state
        .config
        .bind_addr
        .parse()
        .map_err(|_| HubError::InvalidAddress(state.config.bind_addr.clone()))?;

    let listener = TcpListener::bind(addr).await.map_err(|source| HubError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    info!(%addr, "Starting hub server");

    serve(listener, state, shutdown).await
}
