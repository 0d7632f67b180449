//! WebSocket streaming connection
//!
//! Each text frame carries one activity; replies are written back on the same
//! socket.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connector::ActivitySender;
use crate::error::{ChannelError, Result};
use crate::server::ServerState;
use crate::types::Activity;

/// Upgrade handler for the streaming endpoint
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Delivers activities on the socket they arrived on
struct SocketSender {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl ActivitySender for SocketSender {
    async fn send(&self, activity: &Activity) -> Result<()> {
        let json = serde_json::to_string(activity)?;
        self.tx
            .send(Message::Text(json.into()))
            .map_err(|_| ChannelError::WebSocket("connection closed".to_string()))
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    info!("Streaming connection opened");

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let sender = Arc::new(SocketSender { tx: tx.clone() });
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<Activity>(text.as_str()) {
                    Ok(activity) => {
                        // Turns run concurrently; a slow backend call must not
                        // hold up later frames.
                        let state = Arc::clone(&state);
                        let sender = Arc::clone(&sender);
                        tokio::spawn(async move {
                            state.adapter.process(&activity, sender.as_ref()).await;
                        });
                    }
                    Err(e) => warn!("Invalid activity on streaming connection: {}", e),
                },
                Ok(Message::Ping(data)) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    debug!("Streaming connection closed by client");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Streaming connection error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Streaming connection closed");
}

#[cfg(test)]
mod tests {
    use crate::server::{serve, ServerState, MESSAGES_PATH};
    use crate::test_support::{message_activity, turn_handler, RecordingSender};
    use crate::types::Activity;
    use crate::BotAdapter;
    use futures::{SinkExt, StreamExt};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    async fn start() -> (String, Arc<RecordingSender>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = Arc::new(RecordingSender::new());
        let state = ServerState {
            adapter: Arc::new(BotAdapter::new(turn_handler(false))),
            connector: connector.clone(),
        };
        tokio::spawn(serve(listener, state, std::future::pending()));
        (format!("ws://{}{}", addr, MESSAGES_PATH), connector)
    }

    async fn next_activity<S>(socket: &mut S) -> Activity
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_reply_on_same_socket() {
        let (url, connector) = start().await;
        let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let activity = message_activity("user-1", "hi", "http://localhost:1");
        socket
            .send(Message::Text(serde_json::to_string(&activity).unwrap().into()))
            .await
            .unwrap();

        let reply = next_activity(&mut socket).await;
        assert_eq!(reply.text.as_deref(), Some("echo: hi"));
        assert_eq!(reply.reply_to_id, activity.id);
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_close_connection() {
        let (url, _) = start().await;
        let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        socket.send(Message::Text("garbage".into())).await.unwrap();

        let activity = message_activity("user-2", "still there?", "http://localhost:1");
        socket
            .send(Message::Text(serde_json::to_string(&activity).unwrap().into()))
            .await
            .unwrap();

        let reply = next_activity(&mut socket).await;
        assert_eq!(reply.text.as_deref(), Some("echo: still there?"));
    }
}
