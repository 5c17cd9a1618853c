//! HTTP surface: the WebSocket upgrade plus the pull-style reads that
//! share the message store with the live relay.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::Method,
    middleware,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use tandem_shared::protocol::{ClientEvent, ServerEvent};
use tandem_shared::types::{ConnectionRecord, Message, UserId};
use tandem_shared::RelayError;

use crate::config::ServerConfig;
use crate::db::SharedDb;
use crate::error::ApiError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::relay::{FailurePolicy, RelayEngine, Session};

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub engine: Arc<RelayEngine>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .route(
            "/api/users/{id}/conversations/{with_id}",
            get(conversation_history).delete(clear_conversation),
        )
        .route("/api/users/{id}/unread", get(unread_count))
        .route("/api/connections", post(create_connection))
        .route("/api/connections/{id}/respond", post(respond_connection))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    state.rate_limiter.clone(),
                    rate_limit_middleware,
                )),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    instance: String,
    version: &'static str,
    live_connections: usize,
}

#[derive(Serialize)]
struct UnreadResponse {
    count: i64,
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: bool,
}

#[derive(Deserialize)]
struct CreateConnectionRequest {
    requester_id: UserId,
    receiver_id: UserId,
}

#[derive(Deserialize)]
struct RespondConnectionRequest {
    actor_id: UserId,
    accept: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        instance: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        live_connections: state.engine.registry().connection_count().await,
    })
}

fn require_valid(id: UserId, what: &str) -> Result<UserId, ApiError> {
    if id.is_valid() {
        Ok(id)
    } else {
        Err(ApiError::BadRequest(format!("invalid {what}: {id}")))
    }
}

/// Ordered history for a pair; consistent with anything observed over the
/// live connection, since both go through the same store.
async fn conversation_history(
    State(state): State<AppState>,
    Path((id, with_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user = require_valid(UserId(id), "user id")?;
    let with = require_valid(UserId(with_id), "counterparty id")?;

    let db = state.db.lock().await;
    Ok(Json(db.conversation_between(user, with)?))
}

async fn unread_count(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UnreadResponse>, ApiError> {
    let user = require_valid(UserId(id), "user id")?;

    let db = state.db.lock().await;
    Ok(Json(UnreadResponse {
        count: db.unread_count(user)?,
    }))
}

/// Bulk delete of a conversation. Best-effort by policy: a store failure
/// is logged and reported as `cleared: false`, never as a hard error.
async fn clear_conversation(
    State(state): State<AppState>,
    Path((id, with_id)): Path<(i64, i64)>,
) -> Result<Json<ClearResponse>, ApiError> {
    let user = require_valid(UserId(id), "user id")?;
    let with = require_valid(UserId(with_id), "counterparty id")?;

    let result = {
        let db = state.db.lock().await;
        db.clear_conversation(user, with)
    };
    let cleared = FailurePolicy::BestEffort
        .absorb(result, "clear_conversation")
        .ok()
        .flatten()
        .is_some();

    if cleared {
        info!(user = %user, with = %with, "conversation cleared");
        state.engine.notify_conversation_cleared(user, with).await;
    }

    Ok(Json(ClearResponse { cleared }))
}

/// Create (or reopen) a connection request. MustSucceed policy: the write
/// is the point of the request, so failures surface to the caller.
async fn create_connection(
    State(state): State<AppState>,
    Json(req): Json<CreateConnectionRequest>,
) -> Result<Json<ConnectionRecord>, ApiError> {
    let requester = require_valid(req.requester_id, "requester id")?;
    let receiver = require_valid(req.receiver_id, "receiver id")?;

    let record = {
        let db = state.db.lock().await;
        db.create_connection_request(requester, receiver)?
    };

    // Persisted; now tell the receiver, if they are online. Loss of the
    // notification is acceptable.
    state.engine.notify_connection_request(&record).await;

    Ok(Json(record))
}

/// Accept or reject a pending request. MustSucceed, same as creation.
async fn respond_connection(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<RespondConnectionRequest>,
) -> Result<Json<ConnectionRecord>, ApiError> {
    let actor = require_valid(req.actor_id, "actor id")?;

    let record = {
        let db = state.db.lock().await;
        db.respond_to_connection(id, actor, req.accept)?
    };

    state.engine.notify_connection_updated(&record, actor).await;

    Ok(Json(record))
}

// ---------------------------------------------------------------------------
// WebSocket plumbing
// ---------------------------------------------------------------------------

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one live connection: a writer task drains the session's event
/// channel onto the socket while this task decodes inbound frames and
/// feeds them to the relay engine in arrival order.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut session = Session::new(tx);
    let conn_id = session.conn_id;

    debug!(conn = %conn_id, "websocket connection opened");

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode outbound event");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                // Peer is gone; the registry prunes this handle on the
                // next snapshot.
                break;
            }
        }
    });

    while let Some(Ok(frame)) = ws_rx.next().await {
        match frame {
            WsMessage::Text(text) => match ClientEvent::from_json(text.as_str()) {
                Ok(event) => state.engine.handle_event(&mut session, event).await,
                Err(err) => session.push_error(&err),
            },
            WsMessage::Binary(_) => {
                session.push_error(&RelayError::MalformedEvent(
                    "binary frames are not supported".into(),
                ));
            }
            WsMessage::Close(_) => break,
            // Ping/pong are answered by the protocol stack.
            _ => {}
        }
    }

    state.engine.disconnect(&session).await;
    writer.abort();

    debug!(conn = %conn_id, "websocket connection closed");
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP/WebSocket server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
