// Shared helpers for integration tests
//
// FakeDriver plays the driver side of a pipe connection: it reads the
// client's calls and writes responses, creates, disposes and events.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use playwright_dispatch::Connection;
use playwright_dispatch::server::transport::write_frame;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

/// Installs a test-friendly tracing subscriber once per binary.
///
/// Control verbosity with `RUST_LOG`, e.g. `RUST_LOG=playwright_dispatch=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Driver end of an in-memory pipe connection
pub struct FakeDriver {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
}

/// Builds a connection over an in-memory pipe and starts its read loop.
pub fn connect() -> (Arc<Connection>, FakeDriver) {
    let (ours, theirs) = tokio::io::duplex(256 * 1024);
    let (ours_read, ours_write) = tokio::io::split(ours);
    let (theirs_read, theirs_write) = tokio::io::split(theirs);
    let connection = Connection::over_pipe(ours_write, ours_read);
    connection.spawn_run();
    (
        connection,
        FakeDriver {
            reader: theirs_read,
            writer: theirs_write,
        },
    )
}

impl FakeDriver {
    pub async fn send(&mut self, message: Value) {
        write_frame(&mut self.writer, &serde_json::to_vec(&message).unwrap())
            .await
            .unwrap();
    }

    /// Writes raw bytes as one frame, for malformed-input tests.
    pub async fn send_raw(&mut self, frame: &[u8]) {
        write_frame(&mut self.writer, frame).await.unwrap();
    }

    /// Reads the next call the client sent.
    pub async fn next_request(&mut self) -> Value {
        let mut len = [0u8; 4];
        tokio::time::timeout(Duration::from_secs(5), self.reader.read_exact(&mut len))
            .await
            .expect("client sent no request")
            .unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(len) as usize];
        self.reader.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Reads the next call and checks its target and method.
    pub async fn expect_request(&mut self, guid: &str, method: &str) -> Value {
        let request = self.next_request().await;
        assert_eq!(request["guid"], guid, "unexpected target in {request}");
        assert_eq!(request["method"], method, "unexpected method in {request}");
        request
    }

    pub async fn respond(&mut self, id: &Value, result: Value) {
        self.send(json!({ "id": id, "result": result })).await;
    }

    pub async fn fail(&mut self, id: &Value, name: &str, message: &str) {
        self.send(json!({
            "id": id,
            "error": { "error": { "name": name, "message": message, "stack": "at driver" } }
        }))
        .await;
    }

    pub async fn create(&mut self, parent: &str, type_name: &str, guid: &str, initializer: Value) {
        self.send(json!({
            "guid": parent,
            "method": "__create__",
            "params": { "type": type_name, "guid": guid, "initializer": initializer }
        }))
        .await;
    }

    pub async fn dispose(&mut self, guid: &str, reason: Option<&str>) {
        let params = match reason {
            Some(reason) => json!({ "reason": reason }),
            None => json!({}),
        };
        self.send(json!({ "guid": guid, "method": "__dispose__", "params": params }))
            .await;
    }

    pub async fn adopt(&mut self, new_parent: &str, guid: &str) {
        self.send(json!({ "guid": new_parent, "method": "__adopt__", "params": { "guid": guid } }))
            .await;
    }

    pub async fn event(&mut self, guid: &str, method: &str, params: Value) {
        self.send(json!({ "guid": guid, "method": method, "params": params }))
            .await;
    }

    /// Closes the driver's write side; the client sees end of stream.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }

    /// Creates a top-level page with a main frame showing `document_id`.
    pub async fn create_page(&mut self, page: &str, frame: &str, document_id: &str) {
        self.create(
            "",
            "Frame",
            frame,
            json!({ "url": "about:blank", "name": "", "documentId": document_id, "loadStates": ["load"] }),
        )
        .await;
        self.create("", "Page", page, json!({ "mainFrame": { "guid": frame } }))
            .await;
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Spawns `future` so the test can play the driver while it runs.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future)
}
