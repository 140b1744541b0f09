//! Relay-Connector – Baut den physischen Kanal zum Relay auf
//!
//! Der Transport arbeitet nur mit zwei Text-Kanaelen (`RelayChannel`). Der
//! `WebSocketConnector` pumpt diese Kanaele in einen WebSocket; Tests
//! verwenden einen In-Memory-Connector.
//!
//! ## Lebensdauer
//! - Wird `outgoing` gedroppt, schliesst der Schreib-Task den WebSocket
//! - Endet der WebSocket (Close, Fehler), wird `incoming` geschlossen

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{SignalingError, SignalingResult};

/// Offener Kanal zum Relay
pub struct RelayChannel {
    /// Text-Frames zum Relay
    pub outgoing: mpsc::UnboundedSender<String>,
    /// Text-Frames vom Relay; `None` bedeutet Kanal geschlossen
    pub incoming: mpsc::UnboundedReceiver<String>,
}

/// Baut Kanaele zum Relay auf
#[async_trait]
pub trait RelayConnector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> SignalingResult<RelayChannel>;
}

/// Connector fuer `ws://` und `wss://`
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn neu() -> Self {
        Self
    }
}

#[async_trait]
impl RelayConnector for WebSocketConnector {
    async fn open(&self, url: &str) -> SignalingResult<RelayChannel> {
        let (ws, _antwort) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SignalingError::WebSocket(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        // Schreib-Task: Transport -> WebSocket
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    tracing::warn!(fehler = %e, "Senden an Relay fehlgeschlagen");
                    break;
                }
            }
            if let Err(e) = ws_tx.close().await {
                tracing::debug!(fehler = %e, "WebSocket-Close fehlgeschlagen");
            }
        });

        // Lese-Task: WebSocket -> Transport
        tokio::spawn(async move {
            while let Some(item) = ws_rx.next().await {
                match item {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(frame = ?frame, "Relay hat den Kanal geschlossen");
                        break;
                    }
                    Ok(Message::Binary(daten)) => {
                        tracing::warn!(laenge = daten.len(), "Binaer-Frame vom Relay ignoriert");
                    }
                    // Ping/Pong beantwortet tungstenite selbst
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(fehler = %e, "WebSocket-Fehler");
                        break;
                    }
                }
            }
        });

        Ok(RelayChannel {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn lokaler_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws/tok", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn text_frames_in_beide_richtungen() {
        let (listener, url) = lokaler_server().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
            ws.send(Message::text("hallo")).await.unwrap();
            let antwort = loop {
                match ws.next().await.unwrap().unwrap() {
                    Message::Text(text) => break text.as_str().to_owned(),
                    _ => continue,
                }
            };
            ws.close(None).await.unwrap();
            antwort
        });

        let mut kanal = WebSocketConnector::neu().open(&url).await.unwrap();
        // Binaer-Frames erreichen den Transport nicht
        assert_eq!(kanal.incoming.recv().await.as_deref(), Some("hallo"));
        kanal.outgoing.send("antwort".into()).unwrap();

        assert_eq!(server.await.unwrap(), "antwort");
        // Close vom Relay schliesst incoming
        assert_eq!(kanal.incoming.recv().await, None);
    }

    #[tokio::test]
    async fn outgoing_droppen_schliesst_websocket() {
        let (listener, url) = lokaler_server().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    return true;
                }
            }
            false
        });

        let kanal = WebSocketConnector::neu().open(&url).await.unwrap();
        drop(kanal.outgoing);

        assert!(server.await.unwrap());
    }

    #[tokio::test]
    async fn nicht_erreichbarer_relay_ist_websocket_fehler() {
        let (listener, url) = lokaler_server().await;
        drop(listener);

        let ergebnis = WebSocketConnector::neu().open(&url).await;
        assert!(matches!(ergebnis, Err(SignalingError::WebSocket(_))));
    }
}
