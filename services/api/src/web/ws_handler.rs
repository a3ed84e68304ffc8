//! services/api/src/web/ws_handler.rs
//!
//! Live package updates for one report. A forwarding task pushes a snapshot
//! whenever the change feed reports something for the report; the receive
//! loop only watches for refresh requests and the close.

use crate::web::{
    errors::{report_error, HandlerResult, RETRY_MESSAGE},
    packages::PackageListResponse,
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use chrono::Utc;
use coaching_core::packages::{PackageManager, PackageResult, PackageSnapshot};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Upgrades to a WebSocket after checking the report belongs to the caller.
pub async fn packages_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(report_id): Path<Uuid>,
) -> HandlerResult<Response> {
    app_state
        .report_manager(user_id)
        .get(report_id)
        .await
        .map_err(|e| report_error(&e))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id, report_id)))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid, report_id: Uuid) {
    info!(%user_id, %report_id, "Package updates connection opened");

    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));
    let manager = app_state.package_manager(user_id);
    let token = CancellationToken::new();

    let forward_task = {
        let ws_sender = ws_sender.clone();
        let token = token.clone();
        let mut updates = manager.watch(report_id);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    update = updates.next() => match update {
                        Some(result) => {
                            if !send_snapshot(&ws_sender, result).await {
                                break;
                            }
                        }
                        None => {
                            warn!(%report_id, "Change feed ended");
                            break;
                        }
                    },
                }
            }
        })
    };

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::Refresh) => {
                    if !refresh(&manager, report_id, &ws_sender).await {
                        break;
                    }
                }
                Err(e) => warn!("Failed to deserialize client message: {}", e),
            },
            Message::Close(_) => {
                info!("Client sent close message.");
                break;
            }
            _ => {}
        }
    }

    token.cancel();
    if let Err(e) = forward_task.await {
        error!("Package forwarding task failed: {:?}", e);
    }
    info!(%report_id, "Package updates connection closed");
}

async fn refresh(manager: &PackageManager, report_id: Uuid, ws_sender: &WsSender) -> bool {
    send_snapshot(ws_sender, manager.snapshot(report_id).await).await
}

/// Returns `false` once the client can no longer be reached.
async fn send_snapshot(ws_sender: &WsSender, result: PackageResult<PackageSnapshot>) -> bool {
    let msg = match result {
        Ok(snapshot) => ServerMessage::Snapshot {
            packages: PackageListResponse::from_snapshot(snapshot, Utc::now()),
        },
        Err(e) => {
            error!(error = %e, "Package refresh failed");
            ServerMessage::Error {
                message: RETRY_MESSAGE.to_string(),
            }
        }
    };
    send(ws_sender, &msg).await
}

async fn send(ws_sender: &WsSender, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    ws_sender.lock().await.send(Message::Text(json.into())).await.is_ok()
}
