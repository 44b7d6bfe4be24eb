use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::session::{ClientMessage, SignalingRelay};

/// Pump one signaling connection: outbound messages flow through an
/// unbounded channel owned by the relay, inbound frames are parsed and
/// dispatched until the socket closes, then the connection is swept out of
/// every room it joined.
pub async fn handle_signaling_socket(websocket: WebSocket, relay: Arc<SignalingRelay>) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let conn_id = relay.register(tx).await;
    tracing::info!(conn_id, "Signaling connection established");

    // Outbound pump
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::debug!(error = %e, "Failed to send signaling message");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => {
                let Ok(text) = message.to_str() else {
                    continue; // ping/pong/binary frames
                };
                match serde_json::from_str::<ClientMessage>(text) {
                    Ok(client_message) => {
                        relay.handle_message(conn_id, client_message).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            conn_id,
                            error = %e,
                            raw_message = %text,
                            "Unparseable signaling message dropped"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::debug!(conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    relay.disconnect(conn_id).await;
    sender_task.abort();
    tracing::info!(conn_id, "Signaling connection closed");
}
