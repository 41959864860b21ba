//! WebSocket upgrade handler.
//!
//! The socket is upgraded first and authenticated afterwards so a rejected
//! client still receives a machine-readable error frame before the close.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum_extra::TypedHeader;
use axum_extra::headers::Cookie;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chathub_core::error::AppError;
use chathub_realtime::message::ServerFrame;
use chathub_realtime::{CloseReason, ConnectionHandle, ConnectionManager, Outbound};

use crate::dto::request::WsQuery;
use crate::extractors::auth::ACCESS_TOKEN_COOKIE;
use crate::state::AppState;

/// How long the writer gets to flush queued frames after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code for policy violations (RFC 6455).
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close code for unexpected server conditions (RFC 6455).
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// GET /ws/chat?access_token={jwt}
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    cookies: Option<TypedHeader<Cookie>>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = query.access_token.or_else(|| {
        cookies.and_then(|TypedHeader(cookie)| cookie.get(ACCESS_TOKEN_COOKIE).map(str::to_string))
    });

    ws.on_upgrade(move |socket| handle_socket(state, token, socket))
}

async fn handle_socket(state: AppState, token: Option<String>, socket: WebSocket) {
    let manager = Arc::clone(&state.engine.connections);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (handle, outbound_rx) = match manager.connect(token.as_deref()).await {
        Ok(pair) => pair,
        Err(e) => {
            reject(&mut ws_tx, &e).await;
            return;
        }
    };

    let writer = tokio::spawn(write_outbound(ws_tx, outbound_rx));
    let cancel = handle.cancel_token().clone();

    let reason = loop {
        tokio::select! {
            biased;
            // Closed from the server side (eviction, timeout, shutdown).
            _ = cancel.cancelled() => break None,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    manager.handle_inbound(&handle, text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => reject_binary(&handle).await,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => handle.touch().await,
                Some(Ok(Message::Close(_))) | None => break Some(CloseReason::ClientClosed),
                Some(Err(e)) => {
                    warn!(conn_id = %handle.id, error = %e, "WebSocket error");
                    break Some(CloseReason::TransportError);
                }
            }
        }
    };

    if let Some(reason) = reason {
        manager.close(&handle, reason).await;
    }
    finish(manager, handle, writer).await;
}

/// Forward queued frames to the socket until the queue closes or a close
/// frame is written.
async fn write_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        let result = match msg {
            Outbound::Frame(text) => ws_tx.send(Message::Text(text.into())).await,
            Outbound::Ping => ws_tx.send(Message::Ping(Default::default())).await,
            Outbound::Close { code, reason } => {
                let _ = ws_tx
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        };
        if result.is_err() {
            break;
        }
    }
}

/// Report a failed connect to the client and close the socket.
async fn reject(ws_tx: &mut SplitSink<WebSocket, Message>, err: &AppError) {
    let code = if err.kind.is_auth_failure() {
        CLOSE_POLICY_VIOLATION
    } else {
        CLOSE_INTERNAL_ERROR
    };

    let frame = ServerFrame::Error {
        code: err.kind.to_string(),
        seq: None,
        message: err.message.clone(),
    };
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = ws_tx.send(Message::Text(text.into())).await;
    }
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: err.kind.to_string().into(),
        })))
        .await;
}

async fn reject_binary(handle: &ConnectionHandle) {
    handle.touch().await;
    let frame = ServerFrame::Error {
        code: "INVALID_MESSAGE".to_string(),
        seq: None,
        message: "Binary frames are not supported".to_string(),
    };
    if let Ok(text) = serde_json::to_string(&frame) {
        if let Err(e) = handle.send(Outbound::Frame(text)) {
            debug!(conn_id = %handle.id, error = %e, "Could not report binary frame");
        }
    }
}

async fn finish(
    manager: Arc<ConnectionManager>,
    handle: Arc<ConnectionHandle>,
    mut writer: tokio::task::JoinHandle<()>,
) {
    let conn_id = handle.id;
    let user_id = handle.user_id;
    drop(handle);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }

    info!(
        conn_id = %conn_id,
        user_id = %user_id,
        remaining = manager.registry().connection_count(),
        "WebSocket connection closed"
    );
}
