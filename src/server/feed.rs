//! Live scan event feed over websocket.

use super::AppState;
use crate::events::ScanEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::sync::broadcast::{error::RecvError, Receiver};

pub async fn feed(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(bus) = state.analyzer.events() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "event feed is disabled").into_response();
    };
    let events = bus.subscribe();
    ws.on_upgrade(move |socket| relay(socket, events))
}

/// Forward events to the client until either side goes away.
async fn relay(mut socket: WebSocket, mut events: Receiver<ScanEvent>) {
    tracing::debug!("Feed client connected");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("Failed to encode scan event: {}", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Feed client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("Feed client disconnected");
}
