//! Operator event feed WebSocket endpoint.
//!
//! Path: `GET /api/v1/ws/operator`
//!
//! Streams `device-status-changed`, `command-completed` and
//! `telemetry-received` events to every connected operator session.
//! Delivery is best-effort: a session that falls behind skips the overrun
//! and keeps going.

use std::sync::Arc;

use actix_web::{web, Error as ActixError, HttpRequest, HttpResponse};
use actix_ws::{Message as WsMessage, Session};
use bridge_models::ControlPlane;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::AppState;

/// Incoming WebSocket messages from an operator session.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum OperatorClientMessage {
    /// Heartbeat ping from client.
    Ping { ts: i64 },
}

/// Outgoing control messages (events are serialized directly).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum OperatorServerMessage {
    Pong { ts: i64 },
}

/// Handle WebSocket upgrades for `/api/v1/ws/operator`.
#[instrument(skip_all)]
pub async fn operator_ws(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ActixError> {
    let (res, session, msg_stream) = actix_ws::handle(&req, body)?;
    let state: Arc<AppState> = state.get_ref().clone();

    actix_rt::spawn(async move {
        if let Err(e) = operator_ws_loop(state, session, msg_stream).await {
            error!("Operator WS loop error: {}", e);
        }
    });

    Ok(res)
}

/// Core operator WebSocket loop: forward hub events, answer pings.
async fn operator_ws_loop(
    state: Arc<AppState>,
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
) -> Result<(), ActixError> {
    let mut events = state.control_plane().broadcast_hub().subscribe();
    info!("operator session connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let text = match serde_json::to_string(event.as_ref()) {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize operator event: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = session.text(text).await {
                        debug!("Operator WS send error, closing session: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Operator session lagged by {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            item = msg_stream.next() => {
                let Some(item) = item else { break };
                let msg = match item {
                    Ok(m) => m,
                    Err(e) => {
                        error!("Operator WS stream error: {}", e);
                        break;
                    }
                };
                match msg {
                    WsMessage::Text(text) => match serde_json::from_str::<OperatorClientMessage>(&text) {
                        Ok(OperatorClientMessage::Ping { ts }) => {
                            let pong = OperatorServerMessage::Pong { ts };
                            let text = match serde_json::to_string(&pong) {
                                Ok(t) => t,
                                Err(e) => {
                                    error!("Failed to serialize pong: {}", e);
                                    break;
                                }
                            };
                            if let Err(e) = session.text(text).await {
                                error!("Failed to send pong: {}", e);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid operator WS message ignored: {}", e);
                        }
                    },
                    WsMessage::Close(reason) => {
                        info!("Operator WS closed by client: {:?}", reason);
                        break;
                    }
                    WsMessage::Ping(bytes) => {
                        if let Err(e) = session.pong(&bytes).await {
                            error!("Failed to reply WS ping: {}", e);
                            break;
                        }
                    }
                    WsMessage::Pong(_) | WsMessage::Nop => {}
                    WsMessage::Binary(_) => {
                        warn!("Binary frames are not supported on the operator feed");
                    }
                    WsMessage::Continuation(_) => {
                        warn!("Unexpected continuation frame on operator WS, closing");
                        session.close(None).await.ok();
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
