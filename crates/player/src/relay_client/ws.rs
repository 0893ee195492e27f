//! WebSocket connection loop for the relayer.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use shared::{Hello, WsMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{ConnectionState, CoordinationClient};
use crate::error::CoordinationError;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect, serve the connection until it closes, wait the fixed reconnect
/// delay, repeat. Never returns; stopped by aborting the task.
pub(super) async fn run(client: Arc<CoordinationClient>) {
    let url = client.options.url.clone();
    let delay = client.options.reconnect_delay;
    loop {
        client.set_state(ConnectionState::Connecting);
        match connect_async(&url).await {
            Ok((ws, _)) => {
                tracing::info!(url = %url, client_id = %client.identity, "Connected to relay");
                if let Err(e) = handle_connection(&client, ws).await {
                    tracing::warn!("Connection error: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(url = %url, "Connect failed: {}", e);
            }
        }
        client.detach();
        client.set_state(ConnectionState::Disconnected);
        tracing::info!(
            retry_in_ms = delay.as_millis() as u64,
            "Relay connection closed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

async fn handle_connection(
    client: &CoordinationClient,
    ws: WsStream,
) -> Result<(), CoordinationError> {
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Announce ourselves before anything else goes out
    let hello = WsMessage::Hello(Hello {
        client_id: client.identity.clone(),
        ts: client.clock.now_ms(),
    });
    ws_tx.send(Message::Text(hello.encode()?)).await?;

    let (tx, mut outbound) = mpsc::unbounded_channel::<WsMessage>();
    client.attach(tx);
    client.set_state(ConnectionState::Open);

    let result = loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else { break Ok(()) };
                let text = match msg.encode() {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::error!(kind = msg.kind(), error = %e, "encode failed");
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(text)).await {
                    break Err(e.into());
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(t))) => {
                        if let Err(e) = client.handle_frame(&t) {
                            tracing::warn!("Invalid relay message: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Relay closed the connection");
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                }
            }
        }
    };

    client.set_state(ConnectionState::Closing);
    client.detach();
    let _ = ws_tx.close().await;
    result
}
