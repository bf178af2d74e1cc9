// Copyright 2026 Paul Adamson
// Licensed under the Apache License, Version 2.0
//
// Root - Internal object for sending the initialize message
//
// The driver addresses the handshake to the empty guid. Root owns a channel
// for that guid but is never inserted into the object tree.

use crate::error::Result;
use crate::server::channel_owner::{
    ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection, delegate_channel_owner_base,
};
use crate::server::connection::ConnectionLike;
use serde_json::{Value, json};
use std::sync::Arc;

/// Root object for the `initialize` handshake
///
/// # Protocol Flow
///
/// When `initialize()` is called:
/// 1. Sends `initialize` with an `sdkLanguage`
/// 2. The driver creates the top-level objects (`__create__` messages)
/// 3. The driver responds with `{ "playwright": { "guid": "..." } }`
///
/// Because frames are processed in order, every object created in step 2 is
/// in the tree by the time the response resolves.
pub struct Root {
    base: ChannelOwnerImpl,
}

impl Root {
    pub fn new(connection: Arc<dyn ConnectionLike>) -> Self {
        Self {
            base: ChannelOwnerImpl::new(
                ParentOrConnection::Connection(connection),
                "Root".to_string(),
                Arc::from(""),
                Value::Null,
            ),
        }
    }

    /// Sends `initialize` and returns the raw response.
    pub async fn initialize(&self) -> Result<Value> {
        // The driver validates sdkLanguage against the languages it ships
        // bindings for; "rust" is not among them.
        self.base
            .channel()
            .send("initialize", json!({ "sdkLanguage": "python" }))
            .await
    }
}

impl ChannelOwner for Root {
    delegate_channel_owner_base!();

    fn on_event(&self, method: &str, params: Value) {
        self.base.on_event(method, params)
    }

    fn on_dispose(&self, reason: DisposeReason) {
        self.base.on_dispose(reason);
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("guid", &self.base.guid())
            .field("type_name", &self.base.type_name())
            .finish()
    }
}
