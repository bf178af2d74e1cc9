// Generic proxy for protocol types without a dedicated Rust type
//
// Browser, BrowserContext, BrowserType, Playwright and the rest still occupy
// a node in the object tree, receive events and take part in cascading
// disposal. Callers reach their initializer and channel directly.

use crate::error::Result;
use crate::server::channel_owner::{
    ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection, delegate_channel_owner_base,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct RemoteObject {
    base: ChannelOwnerImpl,
}

impl RemoteObject {
    pub fn new(
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Self {
        Self {
            base: ChannelOwnerImpl::new(parent, type_name, guid, initializer),
        }
    }

    /// Calls `method` on the remote object.
    pub async fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
        self.base.ensure_alive()?;
        self.base.channel().send(method, params).await
    }
}

impl ChannelOwner for RemoteObject {
    delegate_channel_owner_base!();

    fn on_event(&self, method: &str, params: Value) {
        self.base.on_event(method, params)
    }

    fn on_dispose(&self, reason: DisposeReason) {
        self.base.on_dispose(reason);
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("guid", &self.base.guid())
            .field("type_name", &self.base.type_name())
            .finish()
    }
}
