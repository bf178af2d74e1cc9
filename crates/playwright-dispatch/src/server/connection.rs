//! Connection layer for the Playwright protocol
//!
//! The connection owns the transport, numbers outgoing calls, keeps the
//! pending-call table and the object tree, and routes every inbound frame.
//!
//! One read loop ([`Connection::run`]) processes inbound frames strictly one
//! at a time and never awaits a caller's continuation: responses complete a
//! oneshot, events are handed to the addressed proxy, which queues them for
//! whoever is listening.

use crate::api::ConnectOptions;
use crate::error::{Error, Result};
use crate::protocol::Root;
use crate::server::channel_owner::{ChannelOwner, DisposeReason, ParentOrConnection};
use crate::server::message::{Inbound, Request};
use crate::server::object_factory::create_object;
use crate::server::object_tree::ObjectTree;
use crate::server::transport::{
    PipeTransport, TransportEvent, TransportReceiver, TransportSender, WebSocketTransport,
};
use bytes::Bytes;
use parking_lot::Mutex as ParkingLotMutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Trait defining the interface that ChannelOwner needs from a Connection
pub trait ConnectionLike: Send + Sync {
    /// Send a call to the driver and await its response
    fn send_message(
        &self,
        guid: &str,
        method: &str,
        params: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>>;

    /// Look up a live object by guid
    fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>>;

    /// Parent guid of a live object; `None` for top-level or unknown guids
    fn parent_of(&self, guid: &str) -> Option<Arc<str>>;

    /// Child guids of a live object, in creation order
    fn children_of(&self, guid: &str) -> Vec<Arc<str>>;

    /// Remove an object and its subtree, notifying each removed object.
    ///
    /// Disposing an unknown or already disposed guid does nothing.
    fn dispose_object(&self, guid: &str, reason: DisposeReason);

    /// True once the transport has closed
    fn is_closed(&self) -> bool;
}

type Callback = oneshot::Sender<Result<Value>>;

#[derive(Default)]
struct PendingCalls {
    callbacks: HashMap<u32, Callback>,
    /// Set once, when the transport closes
    closed: Option<String>,
}

/// Connection to a Playwright driver
pub struct Connection {
    last_id: AtomicU32,
    pending: ParkingLotMutex<PendingCalls>,
    sender: TokioMutex<Box<dyn TransportSender>>,
    events_rx: TokioMutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    transport_receiver: TokioMutex<Option<Box<dyn TransportReceiver>>>,
    objects: ParkingLotMutex<ObjectTree>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(
        sender: impl TransportSender + 'static,
        receiver: impl TransportReceiver + 'static,
        events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            last_id: AtomicU32::new(0),
            pending: ParkingLotMutex::new(PendingCalls::default()),
            sender: TokioMutex::new(Box::new(sender)),
            events_rx: TokioMutex::new(Some(events_rx)),
            transport_receiver: TokioMutex::new(Some(Box::new(receiver))),
            objects: ParkingLotMutex::new(ObjectTree::new()),
        }
    }

    /// Builds a connection over a length-prefixed byte pipe (e.g. driver stdio).
    ///
    /// The read loop is not started; call [`Connection::spawn_run`].
    pub fn over_pipe<W, R>(writer: W, reader: R) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (transport, events_rx) = PipeTransport::new(writer, reader);
        let (sender, receiver) = transport.into_parts();
        Arc::new(Self::new(sender, receiver, events_rx))
    }

    /// Connects to a driver listening on a WebSocket endpoint.
    ///
    /// The read loop is not started; call [`Connection::spawn_run`].
    pub async fn over_websocket(url: &str, options: &ConnectOptions) -> Result<Arc<Self>> {
        let (transport, events_rx) = WebSocketTransport::connect(url, options).await?;
        let (sender, receiver) = transport.into_parts();
        Ok(Arc::new(Self::new(sender, receiver, events_rx)))
    }

    /// Sends one call and awaits its response.
    ///
    /// Fails immediately with [`Error::Disconnected`] once the transport has
    /// closed. A call still pending when the transport closes resolves with
    /// the same error.
    pub async fn send_call(&self, guid: &str, method: &str, params: Value) -> Result<Value> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;

        let rx = {
            let mut pending = self.pending.lock();
            if let Some(reason) = &pending.closed {
                return Err(Error::Disconnected(reason.clone()));
            }
            let (tx, rx) = oneshot::channel();
            pending.callbacks.insert(id, tx);
            rx
        };

        tracing::debug!(
            "Sending message: id={}, guid='{}', method='{}'",
            id,
            guid,
            method
        );

        let request = Request {
            id,
            guid: Arc::from(guid),
            method: method.to_string(),
            params,
        };

        let frame = match serde_json::to_vec(&request) {
            Ok(frame) => frame,
            Err(e) => {
                self.pending.lock().callbacks.remove(&id);
                return Err(e.into());
            }
        };

        let sent = self.sender.lock().await.send(Bytes::from(frame)).await;
        if let Err(e) = sent {
            // Still ours to fail; otherwise the close path already rejected it
            if self.pending.lock().callbacks.remove(&id).is_some() {
                tracing::error!("Failed to send message id={}: {}", id, e);
                return Err(e);
            }
        }

        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Performs the `initialize` handshake and returns the `Playwright` object.
    ///
    /// The driver creates the top-level objects before it answers, so they
    /// are already in the tree when the response is processed.
    pub async fn initialize(self: &Arc<Self>) -> Result<Arc<dyn ChannelOwner>> {
        let root = Root::new(Arc::clone(self) as Arc<dyn ConnectionLike>);

        let timeout_ms = crate::DEFAULT_TIMEOUT_MS as u64;
        let response = tokio::time::timeout(Duration::from_millis(timeout_ms), root.initialize())
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "Playwright initialization timeout after {}ms",
                    timeout_ms
                ))
            })??;

        let playwright_guid = response["playwright"]["guid"].as_str().ok_or_else(|| {
            Error::ProtocolError("Initialize response missing 'playwright.guid' field".to_string())
        })?;

        tracing::debug!("Initialized Playwright with GUID: {}", playwright_guid);
        self.get_object(playwright_guid)
    }

    /// Starts the read loop on the current runtime.
    pub fn spawn_run(self: &Arc<Self>) -> JoinHandle<()> {
        let connection = Arc::clone(self);
        tokio::spawn(async move { connection.run().await })
    }

    /// Runs the read loop until the transport closes.
    ///
    /// Only the first call does anything; later calls return immediately.
    pub async fn run(self: &Arc<Self>) {
        let receiver = self.transport_receiver.lock().await.take();
        let events = self.events_rx.lock().await.take();
        let (Some(mut transport_receiver), Some(mut events)) = (receiver, events) else {
            tracing::warn!("Connection::run called more than once");
            return;
        };

        let transport_handle = tokio::spawn(async move {
            if let Err(e) = transport_receiver.run().await {
                tracing::debug!("Transport receive loop ended with error: {}", e);
            }
        });

        loop {
            match events.recv().await {
                Some(TransportEvent::Message(frame)) => self.dispatch(&frame),
                Some(TransportEvent::Closed(reason)) => {
                    self.on_transport_closed(&reason);
                    break;
                }
                None => {
                    self.on_transport_closed("transport dropped");
                    break;
                }
            }
        }

        tracing::debug!("Message loop ended (transport closed)");
        let _ = transport_handle.await;
    }

    /// Processes one inbound frame.
    ///
    /// Malformed frames and frames addressed to unknown ids or guids are
    /// logged and dropped; they never stop the read loop.
    pub fn dispatch(self: &Arc<Self>, frame: &[u8]) {
        let result = Inbound::parse(frame).and_then(|inbound| self.dispatch_inbound(inbound));
        if let Err(e) = result {
            tracing::warn!("Dropped inbound frame: {}", e);
        }
    }

    fn dispatch_inbound(self: &Arc<Self>, inbound: Inbound) -> Result<()> {
        match inbound {
            Inbound::Response { id, outcome } => {
                tracing::debug!("Processing response for ID: {}", id);
                let callback = self.pending.lock().callbacks.remove(&id).ok_or_else(|| {
                    Error::ProtocolError(format!("Cannot find request to respond: id={}", id))
                })?;
                // The caller may have stopped waiting
                let _ = callback.send(outcome.map_err(Error::from));
                Ok(())
            }
            Inbound::Create {
                parent,
                type_name,
                guid,
                initializer,
            } => self.handle_create(parent, type_name, guid, initializer),
            Inbound::Dispose { guid, reason } => {
                if !self.objects.lock().contains(&guid) {
                    tracing::debug!("Ignoring __dispose__ for unknown object: guid={}", guid);
                    return Ok(());
                }
                self.dispose_object(&guid, reason);
                Ok(())
            }
            Inbound::Adopt { parent, guid } => {
                self.objects.lock().reparent(&guid, &parent)?;
                tracing::debug!("Adopted {} into {}", guid, parent);
                Ok(())
            }
            Inbound::Event {
                guid,
                method,
                params,
            } => {
                let object = self.objects.lock().get(&guid).ok_or_else(|| {
                    Error::ProtocolError(format!(
                        "Event for unknown object: guid={}, method={}",
                        guid, method
                    ))
                })?;
                object.on_event(&method, params);
                Ok(())
            }
        }
    }

    fn handle_create(
        self: &Arc<Self>,
        parent_guid: Arc<str>,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Result<()> {
        let parent = {
            let objects = self.objects.lock();
            if objects.contains(&guid) {
                return Err(Error::ProtocolError(format!(
                    "Duplicate object guid: {}",
                    guid
                )));
            }
            if parent_guid.is_empty() {
                ParentOrConnection::Connection(Arc::clone(self) as Arc<dyn ConnectionLike>)
            } else {
                let parent = objects.get(&parent_guid).ok_or_else(|| {
                    Error::ProtocolError(format!(
                        "Parent object not found: {} (creating {} {})",
                        parent_guid, type_name, guid
                    ))
                })?;
                ParentOrConnection::Parent(parent)
            }
        };

        // Constructors may look other objects up, so the tree lock is not held
        let object = create_object(parent, type_name.clone(), Arc::clone(&guid), initializer)?;
        self.objects.lock().insert(&parent_guid, object)?;

        tracing::debug!(
            "Created object: type={}, guid={}, parent={}",
            type_name,
            guid,
            parent_guid
        );
        Ok(())
    }

    fn on_transport_closed(&self, reason: &str) {
        let callbacks = {
            let mut pending = self.pending.lock();
            if pending.closed.is_some() {
                return;
            }
            pending.closed = Some(reason.to_string());
            std::mem::take(&mut pending.callbacks)
        };

        tracing::debug!(
            "Connection closed ({}); rejecting {} pending call(s)",
            reason,
            callbacks.len()
        );
        for (_, callback) in callbacks {
            let _ = callback.send(Err(Error::Disconnected(reason.to_string())));
        }

        let objects = self.objects.lock().drain();
        for object in objects {
            object.on_disconnect(reason);
            object.on_dispose(DisposeReason::Protocol);
        }
    }

    /// Number of calls still awaiting a response.
    #[doc(hidden)]
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().callbacks.len()
    }

    /// Number of live objects in the tree.
    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }
}

impl ConnectionLike for Connection {
    fn send_message(
        &self,
        guid: &str,
        method: &str,
        params: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
        let guid = guid.to_string();
        let method = method.to_string();
        Box::pin(async move { self.send_call(&guid, &method, params).await })
    }

    fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
        self.objects.lock().get(guid).ok_or_else(|| {
            Error::ObjectNotFound(format!(
                "{} (object may have been closed or disposed)",
                guid
            ))
        })
    }

    fn parent_of(&self, guid: &str) -> Option<Arc<str>> {
        self.objects.lock().parent_of(guid)
    }

    fn children_of(&self, guid: &str) -> Vec<Arc<str>> {
        self.objects.lock().children_of(guid)
    }

    fn dispose_object(&self, guid: &str, reason: DisposeReason) {
        let removed = self.objects.lock().remove_subtree(guid);
        for object in removed {
            object.on_dispose(reason);
        }
    }

    fn is_closed(&self) -> bool {
        self.pending.lock().closed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::transport::write_frame;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, DuplexStream, ReadHalf, WriteHalf};

    struct Peer {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn next_request(&mut self) -> Value {
            let mut len = [0u8; 4];
            self.reader.read_exact(&mut len).await.unwrap();
            let mut body = vec![0u8; u32::from_le_bytes(len) as usize];
            self.reader.read_exact(&mut body).await.unwrap();
            serde_json::from_slice(&body).unwrap()
        }

        async fn send(&mut self, value: Value) {
            write_frame(&mut self.writer, &serde_json::to_vec(&value).unwrap())
                .await
                .unwrap();
        }
    }

    fn connected() -> (Arc<Connection>, Peer) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (ours_read, ours_write) = tokio::io::split(ours);
        let (theirs_read, theirs_write) = tokio::io::split(theirs);
        let connection = Connection::over_pipe(ours_write, ours_read);
        connection.spawn_run();
        (
            connection,
            Peer {
                reader: theirs_read,
                writer: theirs_write,
            },
        )
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_increasing() {
        let (connection, mut peer) = connected();

        let first = tokio::spawn({
            let c = Arc::clone(&connection);
            async move { c.send_call("page@1", "title", Value::Null).await }
        });
        let request = peer.next_request().await;
        assert_eq!(request["method"], "title");
        assert!(request.get("params").is_none());
        let first_id = request["id"].as_u64().unwrap();

        let second = tokio::spawn({
            let c = Arc::clone(&connection);
            async move { c.send_call("page@1", "url", json!({})).await }
        });
        let request = peer.next_request().await;
        let second_id = request["id"].as_u64().unwrap();
        assert!(second_id > first_id);

        peer.send(json!({"id": second_id, "result": {"value": "b"}}))
            .await;
        peer.send(json!({"id": first_id, "result": {"value": "a"}}))
            .await;

        assert_eq!(first.await.unwrap().unwrap(), json!({"value": "a"}));
        assert_eq!(second.await.unwrap().unwrap(), json!({"value": "b"}));
        assert_eq!(connection.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_then_dispose_cascades() {
        let (connection, mut peer) = connected();

        peer.send(json!({"guid": "", "method": "__create__",
            "params": {"type": "BrowserContext", "guid": "ctx@1", "initializer": {}}}))
            .await;
        peer.send(json!({"guid": "ctx@1", "method": "__create__",
            "params": {"type": "Worker", "guid": "worker@1", "initializer": {}}}))
            .await;

        // A round trip guarantees the creates above were dispatched
        let call = tokio::spawn({
            let c = Arc::clone(&connection);
            async move { c.send_call("ctx@1", "noop", Value::Null).await }
        });
        let id = peer.next_request().await["id"].clone();
        peer.send(json!({"id": id})).await;
        call.await.unwrap().unwrap();

        assert_eq!(connection.object_count(), 2);
        let worker = connection.get_object("worker@1").unwrap();
        assert_eq!(worker.parent().unwrap().guid(), "ctx@1");

        connection.dispose_object("ctx@1", DisposeReason::Closed);
        assert_eq!(connection.object_count(), 0);
        assert!(worker.is_disposed());
        assert!(connection.get_object("worker@1").is_err());

        // Second dispose is a no-op
        connection.dispose_object("ctx@1", DisposeReason::Closed);
    }

    #[tokio::test]
    async fn test_send_on_dead_transport_is_disconnected() {
        // No read loop: the transport is gone but `Closed` is never processed
        let (ours, theirs) = tokio::io::duplex(1024);
        let (ours_read, ours_write) = tokio::io::split(ours);
        let connection = Connection::over_pipe(ours_write, ours_read);
        drop(theirs);

        let err = connection
            .send_call("", "first", json!({}))
            .await
            .unwrap_err();
        assert!(err.is_disconnected(), "write failure: {err}");

        let err = connection
            .send_call("", "second", json!({}))
            .await
            .unwrap_err();
        assert!(err.is_disconnected(), "closed sink: {err}");
        assert_eq!(connection.pending_calls(), 0);
    }
}
