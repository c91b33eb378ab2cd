//! End-to-end checks of the tungstenite transport against a local server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use storyforge_player::infrastructure::websocket::{create_connection, ReconnectConfig, TungsteniteConnector};
use storyforge_player::state::{QueryCache, SceneChatState};
use storyforge_player::SceneChatService;
use storyforge_shared::Message;

const WAIT: Duration = Duration::from_secs(5);

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        max_attempts: 3,
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/api/game/ws/scenes/s1/characters/c1", listener.local_addr().unwrap());
    (listener, url)
}

#[tokio::test]
async fn authenticates_then_streams_reply_into_cache() {
    let (listener, url) = bind().await;
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            let WsMessage::Text(text) = frame else { continue };
            let is_chat = text.contains("\"messages\"");
            frames_tx.send(text).unwrap();
            if is_chat {
                for chunk in ["Good ", "evening."] {
                    let reply = format!(r#"{{"type":"chat_chunk","content":"{chunk}"}}"#);
                    ws.send(WsMessage::Text(reply)).await.unwrap();
                }
                ws.send(WsMessage::Text(r#"{"type":"chat_complete"}"#.into()))
                    .await
                    .unwrap();
            }
        }
    });

    let cache = QueryCache::new();
    let connection = create_connection(Arc::new(TungsteniteConnector), fast_reconnect());
    let service = SceneChatService::new(connection, SceneChatState::new(cache, "s1", "c1"));
    service.connect_to(
        url,
        BTreeMap::from([("Authorization".to_string(), "Bearer abc".to_string())]),
    );

    eventually(|| service.is_connected()).await;
    let auth = tokio::time::timeout(WAIT, frames_rx.recv()).await.unwrap().unwrap();
    assert_eq!(
        auth,
        r#"{"type":"AUTHENTICATE","payload":{"Authorization":"Bearer abc"}}"#
    );

    assert!(service.send_message("Hello"));
    eventually(|| service.messages().len() == 2 && service.messages()[1].content == "Good evening.").await;
    assert_eq!(service.messages()[1], Message::assistant("Good evening.", "s1"));
}

#[tokio::test]
async fn dropped_socket_is_retried() {
    let (listener, url) = bind().await;
    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel::<usize>();

    tokio::spawn(async move {
        let mut held = Vec::new();
        for n in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            accepted_tx.send(n).unwrap();
            if n == 0 {
                // No close handshake: the client sees an abnormal closure
                drop(ws);
            } else {
                held.push(ws);
            }
        }
        tokio::time::sleep(WAIT).await;
    });

    let connection = create_connection(Arc::new(TungsteniteConnector), fast_reconnect());
    let service = SceneChatService::new(connection, SceneChatState::new(QueryCache::new(), "s1", "c1"));
    service.connect_to(url, BTreeMap::new());

    for expected in 0..2 {
        let n = tokio::time::timeout(WAIT, accepted_rx.recv()).await.unwrap().unwrap();
        assert_eq!(n, expected);
    }
    eventually(|| service.is_connected()).await;
}

#[tokio::test]
async fn server_normal_close_is_not_retried() {
    let (listener, url) = bind().await;
    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel::<()>();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            accepted_tx.send(()).unwrap();
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "scene over".into(),
            };
            ws.close(Some(frame)).await.unwrap();
            while ws.next().await.is_some() {}
        }
    });

    let connection = create_connection(Arc::new(TungsteniteConnector), fast_reconnect());
    let service = SceneChatService::new(connection, SceneChatState::new(QueryCache::new(), "s1", "c1"));
    service.connect_to(url, BTreeMap::new());

    tokio::time::timeout(WAIT, accepted_rx.recv()).await.unwrap().unwrap();
    eventually(|| !service.is_connected()).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(accepted_rx.try_recv().is_err());
}
