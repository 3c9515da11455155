//! WebSocket handler streaming mutation notifications
//!
//! Provides `/api/notifications/ws`. The first client message authenticates
//! the socket with the session's access token; afterwards the client receives
//! every notification addressed to that user.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::notification::Notification;
use crate::AppState;

/// WebSocket request from client
#[derive(Debug, Clone, Deserialize)]
pub struct WsClientRequest {
    /// subscribe, unsubscribe or ping
    pub action: String,
    /// Access token (required for subscribe)
    pub token: Option<String>,
}

/// WebSocket message to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "subscribed")]
    Subscribed { user_id: Uuid },
    #[serde(rename = "notification")]
    Notification(Notification),
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "pong")]
    Pong,
}

impl WsMessage {
    fn to_text(&self) -> Message {
        let text = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"encoding failed: {}"}}"#, e)
        });
        Message::Text(text.into())
    }
}

/// GET /api/notifications/ws
///
/// Client sends:
/// ```json
/// { "action": "subscribe", "token": "<access token>" }
/// ```
///
/// Server streams:
/// ```json
/// { "type": "notification", "level": "success", "title": "Prêt supprimé avec succès", ... }
/// ```
pub async fn notifications_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    info!("New notifications WebSocket connection");

    let token = match wait_for_subscription(&mut receiver).await {
        Ok(token) => token,
        Err(e) => {
            let _ = sender
                .send(WsMessage::Error { message: e }.to_text())
                .await;
            return;
        }
    };

    let user_id = match state.sessions.resolve(&token).await {
        Ok(session) => session.user_id(),
        Err(e) => {
            warn!("Notification subscription rejected: {}", e);
            let _ = sender
                .send(
                    WsMessage::Error {
                        message: e.to_string(),
                    }
                    .to_text(),
                )
                .await;
            return;
        }
    };

    info!(user_id = %user_id, "Notifications subscription");

    // Subscribe before confirming so nothing published in between is lost
    let mut broadcast_rx = state.notifier.subscribe();

    if sender
        .send(WsMessage::Subscribed { user_id }.to_text())
        .await
        .is_err()
    {
        return;
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                match result {
                    Ok(notification) => {
                        if !state.sessions.is_active(&token) {
                            close_ended_session(&mut sender, user_id).await;
                            break;
                        }
                        if notification.user_id == user_id {
                            if let Err(e) = sender.send(WsMessage::Notification(notification).to_text()).await {
                                debug!("WebSocket send error: {}", e);
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Missed {} notifications", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Notification channel closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if !state.sessions.is_active(&token) {
                    close_ended_session(&mut sender, user_id).await;
                    break;
                }
                if let Err(e) = sender.send(Message::Ping(axum::body::Bytes::new())).await {
                    debug!("Heartbeat failed: {}", e);
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(req) = serde_json::from_str::<WsClientRequest>(&text) {
                            match req.action.as_str() {
                                "ping" => {
                                    let _ = sender.send(WsMessage::Pong.to_text()).await;
                                }
                                "unsubscribe" => {
                                    info!("Client unsubscribed");
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(user_id = %user_id, "Notifications WebSocket connection closed");
}

async fn close_ended_session(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    user_id: Uuid,
) {
    info!(user_id = %user_id, "Session ended, closing notifications stream");
    let _ = sender
        .send(
            WsMessage::Error {
                message: "Session terminée".to_string(),
            }
            .to_text(),
        )
        .await;
    let _ = sender.send(Message::Close(None)).await;
}

async fn wait_for_subscription(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Result<String, String> {
    let first_message = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => return parse_subscription(&text),
                Ok(Message::Close(_)) => {
                    return Err("Connection closed before subscription".to_string())
                }
                Err(e) => return Err(format!("WebSocket error: {}", e)),
                _ => continue,
            }
        }
        Err("Connection closed before subscription".to_string())
    });

    first_message
        .await
        .map_err(|_| "Subscription timeout".to_string())?
}

/// Extract the access token from a subscribe request
fn parse_subscription(text: &str) -> Result<String, String> {
    let req: WsClientRequest =
        serde_json::from_str(text).map_err(|e| format!("Invalid request: {}", e))?;

    if req.action != "subscribe" {
        return Err("First message must be subscribe action".to_string());
    }

    req.token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "token is required for subscription".to_string())
}
