use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::hub::{Frame, Hub};

pub fn router(hub: Hub) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(hub)
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Hub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

fn text(frame: &Frame) -> Message {
    Message::Text(frame.to_string().into())
}

async fn handle_socket(socket: WebSocket, hub: Hub) {
    let (mut sink, mut stream) = socket.split();
    let (backlog, mut updates) = hub.connect().await;
    info!(clients = hub.client_count(), "client connected");

    for frame in &backlog {
        if sink.send(text(frame)).await.is_err() {
            debug!("client went away during backlog");
            return;
        }
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(frame) => {
                    if sink.send(text(&frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client lagging, dropped updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Client frames carry nothing we act on; only watch for the close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    debug!("client disconnected");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio_tungstenite::connect_async;
    use weather_core::{ContentHash, KeeperEvent};

    use super::*;

    fn event(geoid: u32, snapshot: Value) -> KeeperEvent {
        KeeperEvent::New {
            geoid,
            hash: ContentHash::of(&snapshot).unwrap(),
            snapshot: Arc::new(snapshot),
            observed_at: Utc::now(),
        }
    }

    async fn serve(hub: Hub) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(hub)).await.unwrap();
        });
        addr
    }

    async fn next_json<S>(stream: &mut S) -> Value
    where
        S: futures_util::Stream<
                Item = Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>,
            > + Unpin,
    {
        let message = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended")
            .expect("websocket error");
        serde_json::from_str(message.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn websocket_gets_backlog_then_live_updates() {
        let hub = Hub::new(8);
        hub.publish(&event(213, json!({ "temp": 5 }))).await.unwrap();
        let addr = serve(hub.clone()).await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        let first = next_json(&mut ws).await;
        assert_eq!(first["geoid"], 213);
        assert_eq!(first["data"], json!({ "temp": 5 }));

        // The backlog only arrives after the server subscribed to live frames.
        assert_eq!(hub.client_count(), 1);
        hub.publish(&event(54, json!({ "temp": -2 }))).await.unwrap();
        let second = next_json(&mut ws).await;
        assert_eq!(second["geoid"], 54);
        assert_eq!(second["event"], "new");
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let addr = serve(Hub::new(8)).await;
        let body = reqwest::get(format!("http://{addr}/healthz"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }
}
