//! Device transport WebSocket endpoint.
//!
//! Path: `GET /api/v1/ws/device` (API-key checked at upgrade time).
//!
//! The device speaks first: a `register` frame joins its device group and
//! starts the outbound command stream. After that the client sends
//! `telemetry` and `commandResult` frames at will; every inbound frame
//! doubles as a heartbeat.

use std::sync::Arc;

use actix_web::{web, Error as ActixError, HttpRequest, HttpResponse};
use actix_ws::{Message as WsMessage, Session};
use bridge_models::{
    domain::prelude::{CommandFrame, CommandOutcome},
    DeviceIngress,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::AppState;

/// Incoming WebSocket messages from a device.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum DeviceClientMessage {
    /// Join the device group and start receiving command frames.
    Register {
        #[serde(alias = "deviceId")]
        device_id: String,
    },
    /// One opaque telemetry sample.
    Telemetry {
        #[serde(alias = "deviceId")]
        device_id: String,
        payload: String,
    },
    /// Asynchronous outcome of a previously delivered command.
    CommandResult {
        #[serde(alias = "commandId")]
        command_id: String,
        status: CommandOutcome,
        #[serde(default)]
        result: Option<String>,
    },
}

/// Outgoing WebSocket messages to a device.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum DeviceServerMessage<'a> {
    /// Registration acknowledged.
    Registered {
        #[serde(rename = "deviceId")]
        device_id: &'a str,
    },
    /// Command dispatched to the device group.
    Command {
        #[serde(rename = "deviceId")]
        device_id: &'a str,
        #[serde(rename = "commandId")]
        command_id: &'a str,
        verb: &'a str,
    },
    /// Error frame.
    Error {
        code: &'a str,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

async fn send_json(session: &mut Session, msg: &DeviceServerMessage<'_>) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to serialize device frame: {}", e);
            return false;
        }
    };
    if let Err(e) = session.text(text).await {
        debug!("Device WS send error: {}", e);
        return false;
    }
    true
}

/// Handle WebSocket upgrades for `/api/v1/ws/device`.
#[instrument(skip_all)]
pub async fn device_ws(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ActixError> {
    let (res, session, msg_stream) = actix_ws::handle(&req, body)?;
    let state: Arc<AppState> = state.get_ref().clone();

    actix_rt::spawn(async move {
        if let Err(e) = device_ws_loop(state, session, msg_stream).await {
            error!("Device WS loop error: {}", e);
        }
    });

    Ok(res)
}

/// Forward command frames from the device group to the session until the
/// connection closes or the group channel ends.
fn spawn_forwarder(
    mut frames: broadcast::Receiver<Arc<CommandFrame>>,
    mut session: Session,
    cancel: CancellationToken,
) {
    actix_rt::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Ok(frame) => {
                        let msg = DeviceServerMessage::Command {
                            device_id: &frame.device_id,
                            command_id: &frame.command_id,
                            verb: &frame.verb,
                        };
                        if !send_json(&mut session, &msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Device command stream lagged by {} frames", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

/// Core device WebSocket loop.
async fn device_ws_loop(
    state: Arc<AppState>,
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
) -> Result<(), ActixError> {
    let connection_id = Uuid::new_v4().to_string();
    let forward_cancel = CancellationToken::new();
    let mut registered_device: Option<String> = None;

    while let Some(item) = msg_stream.next().await {
        let msg = match item {
            Ok(m) => m,
            Err(e) => {
                error!("Device WS stream error: {}", e);
                break;
            }
        };
        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<DeviceClientMessage>(&text) {
                Ok(DeviceClientMessage::Register { device_id }) => {
                    match state
                        .control_plane()
                        .register_device(&connection_id, &device_id)
                        .await
                    {
                        Ok(frames) => {
                            spawn_forwarder(frames, session.clone(), forward_cancel.child_token());
                            registered_device = Some(device_id.clone());
                            let ack = DeviceServerMessage::Registered {
                                device_id: &device_id,
                            };
                            if !send_json(&mut session, &ack).await {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(device_id, error = %e, "device registration rejected");
                            let err = DeviceServerMessage::Error {
                                code: "NotFound",
                                message: format!("unknown device {device_id}"),
                                details: None,
                            };
                            send_json(&mut session, &err).await;
                            session.close(None).await.ok();
                            break;
                        }
                    }
                }
                Ok(DeviceClientMessage::Telemetry { device_id, payload }) => {
                    if let Err(e) = state
                        .control_plane()
                        .ingest_telemetry(&device_id, &payload)
                        .await
                    {
                        error!(device_id, error = %e, "telemetry ingestion failed");
                    }
                }
                Ok(DeviceClientMessage::CommandResult {
                    command_id,
                    status,
                    result,
                }) => {
                    if let Err(e) = state
                        .control_plane()
                        .ingest_command_result(&command_id, status, result)
                        .await
                    {
                        error!(command_id, error = %e, "command result ingestion failed");
                    }
                }
                Err(e) => {
                    warn!("Invalid device WS message: {}", e);
                    let err = DeviceServerMessage::Error {
                        code: "BadRequest",
                        message: "Invalid device transport frame".into(),
                        details: Some(json!({ "reason": e.to_string() })),
                    };
                    if !send_json(&mut session, &err).await {
                        break;
                    }
                }
            },
            WsMessage::Close(reason) => {
                info!(
                    device_id = registered_device.as_deref().unwrap_or("<unregistered>"),
                    "Device WS closed by client: {:?}", reason
                );
                break;
            }
            WsMessage::Ping(bytes) => {
                if let Err(e) = session.pong(&bytes).await {
                    error!("Failed to reply WS ping: {}", e);
                    break;
                }
            }
            WsMessage::Pong(_) => {
                // keep-alive
            }
            WsMessage::Binary(_) => {
                let err = DeviceServerMessage::Error {
                    code: "UnsupportedMediaType",
                    message: "Binary frames are not supported on the device transport".into(),
                    details: None,
                };
                if !send_json(&mut session, &err).await {
                    break;
                }
            }
            WsMessage::Continuation(_) => {
                warn!("Unexpected continuation frame on device WS, closing");
                session.close(None).await.ok();
                break;
            }
            WsMessage::Nop => {}
        }
    }

    // Drop the command forwarder with the connection.
    forward_cancel.cancel();

    Ok(())
}
