// Playwright transport layer
//
// Moves whole frames between the client and the Playwright driver.
// - PipeTransport: length-prefixed frames over a byte pipe (driver stdio)
// - WebSocketTransport: one text message per frame (remote driver endpoint)
//
// Both halves share an EventSink: inbound frames are forwarded as
// TransportEvent::Message, and the first read or write failure (or EOF)
// produces a single TransportEvent::Closed. Once closed, sends fail fast.

use crate::{Error, Result};
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

pub mod pipe;
pub mod websocket;

pub use pipe::{PipeTransport, PipeTransportReceiver, PipeTransportSender, write_frame};
pub use websocket::{WebSocketTransport, WebSocketTransportReceiver, WebSocketTransportSender};

/// Notification emitted by a transport's receiving half
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete, undecoded frame
    Message(Bytes),
    /// The transport is gone; emitted exactly once
    Closed(String),
}

/// Trait for the sending half of a transport
pub trait TransportSender: Send + Unpin {
    /// Write one frame. Fails fast once the transport has closed.
    fn send(&mut self, frame: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Trait for the receiving half of a transport
pub trait TransportReceiver: Send + Unpin {
    /// Run the receive loop until the transport closes.
    ///
    /// The `Closed` event has been emitted by the time this future completes.
    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Shared state between the two halves of a transport.
#[derive(Clone)]
pub(crate) struct EventSink {
    closed: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                closed: Arc::new(AtomicBool::new(false)),
                events,
            },
            events_rx,
        )
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Forward a frame; returns false when nobody is listening any more.
    pub(crate) fn deliver(&self, frame: Bytes) -> bool {
        !self.is_closed() && self.events.send(TransportEvent::Message(frame)).is_ok()
    }

    pub(crate) fn close(&self, reason: impl Into<String>) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let reason = reason.into();
            tracing::debug!("Transport closed: {}", reason);
            let _ = self.events.send(TransportEvent::Closed(reason));
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Disconnected("transport is closed".to_string()))
        } else {
            Ok(())
        }
    }
}
