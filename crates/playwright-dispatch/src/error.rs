// Error types for playwright-dispatch

use std::fmt::Display;
use thiserror::Error;

/// Result type alias for playwright-dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the Playwright driver
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to establish a transport to the driver
    #[error("Failed to connect to Playwright driver: {0}")]
    ConnectionFailed(String),

    /// Transport-level error (pipe or WebSocket I/O)
    ///
    /// A failed read or write closes the transport, so every other pending call
    /// observes [`Error::Disconnected`] shortly after.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Protocol-level error (malformed frame, unknown id or guid)
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The driver answered a call with an `error` payload
    #[error("{}{}", remote_prefix(.name), .message)]
    Remote {
        name: Option<String>,
        message: String,
        stack: Option<String>,
    },

    /// The connection closed while the call was pending, or before it was sent
    #[error("Connection closed: {0}")]
    Disconnected(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value could not be marshalled into the evaluate envelope
    #[error("Cannot encode value: {0}")]
    Encode(String),

    /// An envelope could not be turned back into a value
    #[error("Cannot decode value: {0}")]
    Decode(String),

    /// Timeout waiting for operation
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Navigation did not settle before its deadline
    #[error("Timeout {duration_ms}ms exceeded navigating to \"{url}\"")]
    NavigationTimeout { url: String, duration_ms: u64 },

    /// Navigation was abandoned (superseded, frame detached, connection lost)
    #[error("Navigation to \"{url}\" canceled: {reason}")]
    NavigationCanceled { url: String, reason: String },

    /// Target was closed (page, frame or handle)
    #[error("Target closed: Cannot perform operation on closed {target_type}. {context}")]
    TargetClosed {
        target_type: String,
        context: String,
    },

    /// Channel closed unexpectedly
    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    /// Invalid argument provided to method
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Object not found in registry (may have been closed/disposed)
    #[error("Object not found (may have been closed): {0}")]
    ObjectNotFound(String),

    /// Error with additional context
    #[error("{0}: {1}")]
    Context(String, #[source] Box<Error>),
}

fn remote_prefix(name: &Option<String>) -> String {
    match name {
        Some(name) if !name.is_empty() => format!("{name}: "),
        _ => String::new(),
    }
}

impl Error {
    /// Adds context to the error
    pub fn context(self, msg: impl Into<String>) -> Self {
        Error::Context(msg.into(), Box::new(self))
    }

    /// Returns the innermost error, looking through [`Error::Context`] layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context(_, inner) => inner.root(),
            other => other,
        }
    }

    /// True for both generic and navigation timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.root(),
            Error::Timeout(_) | Error::NavigationTimeout { .. }
        )
    }

    /// True when a navigation was superseded, detached or otherwise abandoned.
    pub fn is_canceled(&self) -> bool {
        matches!(self.root(), Error::NavigationCanceled { .. })
    }

    /// True when the failure is caused by the connection going away.
    pub fn is_disconnected(&self) -> bool {
        matches!(self.root(), Error::Disconnected(_))
    }
}

impl serde::ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Encode(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Decode(msg.to_string())
    }
}
