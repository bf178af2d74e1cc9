// Copyright 2026 Paul Adamson
// Licensed under the Apache License, Version 2.0
//
// Channel Owner - Base trait for all remote protocol objects
//
// Every object the driver creates (Page, Frame, JSHandle, ...) is
// represented locally by a proxy implementing ChannelOwner. The proxy:
// - is identified by the driver-assigned guid
// - sends calls through its Channel
// - receives the events addressed to its guid
// - is told when it is disposed or the connection goes away
//
// Proxies do not own each other. The parent/child structure lives in the
// connection's ObjectTree and is queried by guid.

use crate::error::{Error, Result};
use crate::server::channel::Channel;
use crate::server::connection::ConnectionLike;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reason why an object was disposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
    /// Object was explicitly released by user code
    Closed,
    /// Object was garbage collected by the driver (`__dispose__` with reason "gc")
    GarbageCollected,
    /// Object was disposed by the protocol
    Protocol,
}

/// Where a new object hangs: under another object or at the top level
#[derive(Clone)]
pub enum ParentOrConnection {
    Parent(Arc<dyn ChannelOwner>),
    Connection(Arc<dyn ConnectionLike>),
}

impl ParentOrConnection {
    pub fn connection(&self) -> Arc<dyn ConnectionLike> {
        match self {
            ParentOrConnection::Parent(parent) => parent.connection(),
            ParentOrConnection::Connection(connection) => Arc::clone(connection),
        }
    }

    /// Guid of the parent object, empty for top-level objects.
    pub fn guid(&self) -> &str {
        match self {
            ParentOrConnection::Parent(parent) => parent.guid(),
            ParentOrConnection::Connection(_) => "",
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            ParentOrConnection::Parent(parent) => Some(parent.type_name()),
            ParentOrConnection::Connection(_) => None,
        }
    }
}

/// Base trait for all remote protocol objects.
///
/// Implementors embed a [`ChannelOwnerImpl`] and delegate to it, then add
/// type-specific state and event handling on top.
pub trait ChannelOwner: Send + Sync {
    /// Returns the unique GUID for this object.
    fn guid(&self) -> &str;

    /// Returns the protocol type name (e.g., "Page", "Frame").
    fn type_name(&self) -> &str;

    /// Returns the parent object, if any.
    ///
    /// Top-level objects have no parent. Disposed objects have none either,
    /// because they are no longer in the tree.
    fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
        let connection = self.connection();
        let parent_guid = connection.parent_of(self.guid())?;
        connection.get_object(&parent_guid).ok()
    }

    /// Returns the connection this object belongs to.
    fn connection(&self) -> Arc<dyn ConnectionLike>;

    /// Returns the raw initializer JSON sent in `__create__`.
    fn initializer(&self) -> &Value;

    /// Returns the channel for RPC communication.
    fn channel(&self) -> &Channel;

    /// Handles a protocol event addressed to this object.
    ///
    /// Called by the dispatcher with no connection lock held.
    fn on_event(&self, method: &str, params: Value);

    /// Called once after the object has been removed from the tree.
    ///
    /// Children are notified before their parents.
    fn on_dispose(&self, reason: DisposeReason);

    /// Called once when the connection closes, after every pending call has
    /// been rejected. Objects with waiters use it to wake them.
    fn on_disconnect(&self, _reason: &str) {}

    /// Returns true once the object has been disposed.
    fn is_disposed(&self) -> bool;

    /// Returns true if this object was garbage collected by the driver.
    fn was_collected(&self) -> bool;

    /// Enables downcasting to concrete types.
    fn as_any(&self) -> &dyn Any;
}

/// Downcasts a live object to a concrete proxy type.
///
/// Proxies are cheap handles over shared state, so the result is a clone.
pub fn downcast<T: Clone + 'static>(object: &Arc<dyn ChannelOwner>) -> Result<T> {
    object.as_any().downcast_ref::<T>().cloned().ok_or_else(|| {
        Error::ProtocolError(format!(
            "Object {} has type {}, expected {}",
            object.guid(),
            object.type_name(),
            std::any::type_name::<T>()
        ))
    })
}

/// Base implementation of ChannelOwner that is embedded in protocol objects.
///
/// Clones share the disposed and collected flags.
#[derive(Clone)]
pub struct ChannelOwnerImpl {
    guid: Arc<str>,
    type_name: String,
    connection: Arc<dyn ConnectionLike>,
    channel: Channel,
    initializer: Arc<Value>,
    disposed: Arc<AtomicBool>,
    was_collected: Arc<AtomicBool>,
}

impl ChannelOwnerImpl {
    /// Creates the shared base for a new proxy.
    ///
    /// The caller is responsible for inserting the finished object into the
    /// connection's tree; the base only wires up the channel.
    pub fn new(
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Self {
        let connection = parent.connection();
        let channel = Channel::new(Arc::clone(&guid), Arc::clone(&connection));

        Self {
            guid,
            type_name,
            connection,
            channel,
            initializer: Arc::new(initializer),
            disposed: Arc::new(AtomicBool::new(false)),
            was_collected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn guid_arc(&self) -> Arc<str> {
        Arc::clone(&self.guid)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn connection(&self) -> Arc<dyn ConnectionLike> {
        Arc::clone(&self.connection)
    }

    pub fn initializer(&self) -> &Value {
        &self.initializer
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Logs events no proxy-specific handler claimed.
    pub fn on_event(&self, method: &str, params: Value) {
        tracing::debug!(
            "Unhandled event on {} ({}): {} -> {:?}",
            self.guid,
            self.type_name,
            method,
            params
        );
    }

    /// Marks the object disposed; returns false if it already was.
    pub fn on_dispose(&self, reason: DisposeReason) -> bool {
        if reason == DisposeReason::GarbageCollected {
            self.was_collected.store(true, Ordering::SeqCst);
        }
        let first = !self.disposed.swap(true, Ordering::SeqCst);
        if first {
            tracing::debug!(
                "Disposed {} ({}): {:?}",
                self.guid,
                self.type_name,
                reason
            );
        }
        first
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn was_collected(&self) -> bool {
        self.was_collected.load(Ordering::SeqCst)
    }

    /// Fails with `TargetClosed` once the object has been disposed.
    pub fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            let context = if self.was_collected() {
                "The object has been collected to prevent unbounded heap growth.".to_string()
            } else {
                format!("{} was disposed.", self.guid)
            };
            return Err(Error::TargetClosed {
                target_type: self.type_name.clone(),
                context,
            });
        }
        Ok(())
    }
}

/// Implements the delegating part of [`ChannelOwner`] for a proxy that
/// stores its [`ChannelOwnerImpl`] in a field named `base`.
macro_rules! delegate_channel_owner_base {
    () => {
        fn guid(&self) -> &str {
            self.base.guid()
        }

        fn type_name(&self) -> &str {
            self.base.type_name()
        }

        fn connection(&self) -> std::sync::Arc<dyn $crate::server::connection::ConnectionLike> {
            self.base.connection()
        }

        fn initializer(&self) -> &serde_json::Value {
            self.base.initializer()
        }

        fn channel(&self) -> &$crate::server::channel::Channel {
            self.base.channel()
        }

        fn is_disposed(&self) -> bool {
            self.base.is_disposed()
        }

        fn was_collected(&self) -> bool {
            self.base.was_collected()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    };
}

pub(crate) use delegate_channel_owner_base;
