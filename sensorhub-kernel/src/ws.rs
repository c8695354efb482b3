//! Transport viewer WebSocket.
//!
//! Une connexion = une file bornée enregistrée auprès du hub + une tâche
//! d'écriture qui la vide dans la socket. La fin de l'une ou l'autre tâche
//! (fermeture client, socket cassée, viewer retiré par le hub) mène au même
//! `unregister`, idempotent.

use crate::fanout::{FanoutHub, HubEvent};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn handle_viewer(socket: WebSocket, hub: Arc<FanoutHub>, queue: usize) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<HubEvent>(queue.max(4));
    let viewer_id = hub.register(tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("viewer event not serializable: {e}");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(text) => tracing::trace!("viewer {viewer_id} said: {}", text.as_str()),
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(viewer_id);
}
