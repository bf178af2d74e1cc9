//! Integration tests for connecting over WebSocket
//!
//! A small axum server plays the driver: it answers calls with text frames,
//! reports the handshake headers it saw, and hangs up on request.

use axum::{
    Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
    routing::get,
};
use playwright_dispatch::server::channel_owner::ChannelOwner;
use playwright_dispatch::server::connection::ConnectionLike;
use playwright_dispatch::{ConnectOptions, Connection, Error};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

mod common;

async fn start_driver() -> anyhow::Result<SocketAddr> {
    let app = Router::new().route("/ws", get(ws_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok(addr)
}

async fn ws_handler(ws: WebSocketUpgrade, headers: HeaderMap) -> Response {
    let session = headers
        .get("x-session")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    ws.on_upgrade(move |socket| drive(socket, session))
}

async fn drive(mut socket: WebSocket, session: Option<String>) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let call: Value = serde_json::from_str(text.as_str()).unwrap();
        let reply = match call["method"].as_str() {
            Some("hangUp") => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            Some("spawn") => {
                let create = json!({
                    "guid": "",
                    "method": "__create__",
                    "params": { "type": "JSHandle", "guid": "handle@ws", "initializer": { "preview": "42" } },
                });
                if socket.send(Message::Text(create.to_string().into())).await.is_err() {
                    return;
                }
                json!({ "id": call["id"], "result": { "handle": { "guid": "handle@ws" } } })
            }
            _ => json!({
                "id": call["id"],
                "result": { "echo": call["params"], "session": session },
            }),
        };
        if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
            return;
        }
    }
}

async fn connect(addr: SocketAddr) -> anyhow::Result<Arc<Connection>> {
    let mut headers = HashMap::new();
    headers.insert("x-session".to_string(), "s-1".to_string());
    let options = ConnectOptions::new().headers(headers).timeout(5_000.0);
    let connection = Connection::over_websocket(&format!("ws://{}/ws", addr), &options).await?;
    connection.spawn_run();
    Ok(connection)
}

#[tokio::test]
async fn test_calls_round_trip_with_handshake_headers() -> anyhow::Result<()> {
    common::init_tracing();
    let addr = start_driver().await?;
    let connection = connect(addr).await?;

    let result = connection
        .send_call("page@1", "title", json!({ "n": 1 }))
        .await?;
    assert_eq!(result["echo"], json!({ "n": 1 }));
    assert_eq!(result["session"], "s-1");
    Ok(())
}

#[tokio::test]
async fn test_objects_created_over_websocket() -> anyhow::Result<()> {
    common::init_tracing();
    let addr = start_driver().await?;
    let connection = connect(addr).await?;

    // The create frame precedes the response on the same stream
    let result = connection.send_call("", "spawn", json!({})).await?;
    assert_eq!(result["handle"]["guid"], "handle@ws");
    let handle = connection.get_object("handle@ws")?;
    assert_eq!(handle.type_name(), "JSHandle");
    Ok(())
}

#[tokio::test]
async fn test_server_hang_up_disconnects() -> anyhow::Result<()> {
    common::init_tracing();
    let addr = start_driver().await?;
    let connection = connect(addr).await?;

    let err = connection
        .send_call("", "hangUp", json!({}))
        .await
        .unwrap_err();
    assert!(err.is_disconnected(), "expected Disconnected, got {err}");
    assert!(connection.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_rejects_non_websocket_scheme() {
    common::init_tracing();
    let err = Connection::over_websocket("http://127.0.0.1:1/ws", &ConnectOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(_)));
}

#[tokio::test]
async fn test_handshake_timeout() {
    common::init_tracing();
    // Accepts TCP but never answers the upgrade
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _silent = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        std::future::pending::<()>().await;
    });

    let err = Connection::over_websocket(
        &format!("ws://{}/ws", addr),
        &ConnectOptions::new().timeout(50.0),
    )
    .await
    .unwrap_err();
    assert!(err.is_timeout(), "expected a timeout, got {err}");
}
