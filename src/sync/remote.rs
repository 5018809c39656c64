use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::actor::SessionHandle;
use super::DocumentId;
use crate::buffer::TextBuffer;

/// `ws://host:port/ws/<document_id>` for a relay at `base`.
pub fn room_url(base: &str, document_id: &DocumentId) -> Result<Url> {
    let base = Url::parse(base).map_err(|e| anyhow!("invalid relay url {base:?}: {e}"))?;
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("relay url {base} cannot take a path"))?
        .pop_if_empty()
        .extend(["ws", document_id.as_str()]);
    Ok(url)
}

/// Connect a session actor to a WebSocket peer or relay room.
///
/// Frames from `outbound` go out as binary messages; whatever the socket
/// delivers is handed to the session. When the socket closes or fails, the
/// session gets its disconnect reset. Aborting the returned task drops the
/// connection without resetting the session.
pub async fn connect_peer<B>(
    url: &str,
    handle: SessionHandle<B>,
    mut outbound: mpsc::Receiver<Bytes>,
) -> Result<JoinHandle<()>>
where
    B: TextBuffer + Send + 'static,
{
    let url = Url::parse(url).map_err(|e| anyhow!("invalid ws url: {e}"))?;
    let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .with_context(|| format!("connecting to {url}"))?;
    tracing::info!(document = %handle.document_id(), %url, "connected to peer");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let task = tokio::spawn(async move {
        // Session -> remote
        let document_id = handle.document_id().clone();
        let forward = async move {
            while let Some(frame) = outbound.recv().await {
                if let Err(err) = ws_tx.send(Message::Binary(frame)).await {
                    tracing::warn!(document = %document_id, %err, "send failed");
                    break;
                }
            }
            let _ = ws_tx.close().await;
        };

        // Remote -> session
        let inbound = handle.clone();
        let recv = async move {
            while let Some(msg) = ws_rx.next().await {
                let frame = match msg {
                    Ok(Message::Binary(bytes)) => bytes,
                    Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_str().as_bytes()),
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                    Err(err) => {
                        tracing::warn!(document = %inbound.document_id(), %err, "connection error");
                        break;
                    }
                };
                if inbound.deliver(frame).await.is_err() {
                    break;
                }
            }
        };

        // Either side ending tears down the connection.
        tokio::select! {
            _ = forward => {}
            _ = recv => {}
        }
        tracing::info!(document = %handle.document_id(), "peer disconnected");
        let _ = handle.disconnected().await;
    });

    Ok(task)
}
