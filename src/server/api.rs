use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use colored::*;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use uuid::Uuid;

const ROOM_CAPACITY: usize = 256;

/// A frame relayed inside a room, tagged with the connection that sent it.
type Relayed = (Uuid, Bytes);

#[derive(Clone, Default)]
pub struct AppState {
    rooms: Arc<DashMap<String, broadcast::Sender<Relayed>>>,
}

impl AppState {
    fn join(&self, document_id: &str) -> broadcast::Sender<Relayed> {
        self.rooms
            .entry(document_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .clone()
    }

    /// Drop the room once its last member leaves.
    fn leave(&self, document_id: &str) {
        self.rooms
            .remove_if(document_id, |_, room| room.receiver_count() == 0);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "DX Share Relay" }))
        .route("/health", get(|| async { Json("OK") }))
        .route("/ws/{document_id}", get(ws_handler))
        .with_state(state)
}

/// Serve the relay on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener) -> Result<()> {
    let addr = listener.local_addr()?;
    println!(
        "{} Relay running at {}",
        "✓".green(),
        format!("ws://{}/ws/<document>", addr).bright_blue()
    );
    tracing::info!(%addr, "relay listening");

    axum::serve(listener, router(AppState::default())).await?;
    Ok(())
}

async fn ws_handler(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(state, document_id, socket))
}

async fn handle_ws(state: AppState, document_id: String, socket: WebSocket) {
    let peer = Uuid::new_v4();
    let room = state.join(&document_id);
    let mut rx = room.subscribe();
    tracing::info!(document = %document_id, %peer, "peer joined");

    let (mut sender, mut receiver) = socket.split();

    // Room -> this peer, skipping its own frames
    let send_document = document_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok((from, frame)) => {
                    if from == peer {
                        continue;
                    }
                    if sender.send(Message::Binary(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Missing frames would desynchronise the peer; make it reconnect.
                    tracing::warn!(document = %send_document, %peer, skipped, "peer lagged, closing");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        let _ = sender.close().await;
    });

    // This peer -> room
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let frame = match msg {
                Ok(Message::Binary(bytes)) => bytes,
                Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_str().as_bytes()),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            };
            // No other members yet is fine.
            let _ = room.send((peer, frame));
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = &mut recv_task => {
            send_task.abort();
            let _ = send_task.await;
        }
    }

    state.leave(&document_id);
    tracing::info!(document = %document_id, %peer, "peer left");
}
