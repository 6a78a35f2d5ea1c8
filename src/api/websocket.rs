use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::signal::{ClientEvent, RelayServer, ServerEvent, SignalingHandler};

pub async fn handle_signal_websocket(websocket: WebSocket, server: Arc<RelayServer>) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut handler = SignalingHandler::connect(server, tx).await;
    let client_id = handler.client_id().to_string();
    tracing::info!(client_id = %client_id, "New signaling WebSocket connection established");

    // Outbound events are serialized in the order they were queued
    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_frame() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize server event");
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::text(text)).await {
                tracing::error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) if message.is_close() => break,
            Ok(message) => handle_websocket_message(&mut handler, message).await,
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    handler.cleanup().await;
    sender_task.abort();
    tracing::info!(client_id = %client_id, "Signaling WebSocket connection closed");
}

async fn handle_websocket_message(handler: &mut SignalingHandler, message: Message) {
    let Ok(text) = message.to_str() else {
        return;
    };

    tracing::trace!(client_id = %handler.client_id(), raw_message = %text, "Received signaling frame");

    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => handler.handle_event(event).await,
        Err(e) => {
            tracing::debug!(
                client_id = %handler.client_id(),
                error = %e,
                raw_message = %text,
                "Ignoring malformed signaling frame"
            );
        }
    }
}
