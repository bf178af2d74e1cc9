// Response protocol object
//
// Represents the HTTP response to a Request. Navigation results are
// Responses.

use crate::error::{Error, Result};
use crate::protocol::Request;
use crate::protocol::request::header_map;
use crate::server::channel_owner::{
    ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection, delegate_channel_owner_base,
    downcast,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Response represents an HTTP response.
///
/// Responses are not created directly; they are returned from navigation
/// methods like [`Frame::goto`](crate::protocol::Frame::goto) or from
/// [`Request::response`].
///
/// See: <https://playwright.dev/docs/api/class-response>
#[derive(Clone)]
pub struct ResponseObject {
    base: ChannelOwnerImpl,
    request: Arc<str>,
}

impl ResponseObject {
    /// Creates a new Response and attaches it to its request.
    pub fn new(
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Result<Self> {
        let request: Arc<str> = initializer
            .get("request")
            .and_then(|r| r.get("guid"))
            .and_then(|g| g.as_str())
            .map(Arc::from)
            .ok_or_else(|| {
                Error::ProtocolError(format!("Response {} has no request", guid))
            })?;

        let connection = parent.connection();
        match connection
            .get_object(&request)
            .and_then(|object| downcast::<Request>(&object))
        {
            Ok(owner) => owner.set_response(Arc::clone(&guid)),
            Err(e) => tracing::warn!("Response {} for unknown request {}: {}", guid, request, e),
        }

        let base = ChannelOwnerImpl::new(parent, type_name, guid, initializer);
        Ok(Self { base, request })
    }

    pub fn guid(&self) -> &str {
        self.base.guid()
    }

    /// See: <https://playwright.dev/docs/api/class-response#response-url>
    pub fn url(&self) -> &str {
        self.base
            .initializer()
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    pub fn status(&self) -> u16 {
        self.base
            .initializer()
            .get("status")
            .and_then(|v| v.as_u64())
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(0)
    }

    pub fn status_text(&self) -> &str {
        self.base
            .initializer()
            .get("statusText")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    /// True for status 0 (served without HTTP) and 200-299.
    pub fn ok(&self) -> bool {
        let status = self.status();
        status == 0 || (200..300).contains(&status)
    }

    pub fn headers(&self) -> HashMap<String, String> {
        header_map(self.base.initializer().get("headers"))
    }

    /// The request this response answers.
    pub fn request(&self) -> Result<Request> {
        let object = self.base.connection().get_object(&self.request)?;
        downcast::<Request>(&object)
    }
}

impl ChannelOwner for ResponseObject {
    delegate_channel_owner_base!();

    fn on_event(&self, method: &str, params: Value) {
        self.base.on_event(method, params)
    }

    fn on_dispose(&self, reason: DisposeReason) {
        self.base.on_dispose(reason);
    }
}

impl std::fmt::Debug for ResponseObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseObject")
            .field("guid", &self.base.guid())
            .field("url", &self.url())
            .field("status", &self.status())
            .finish()
    }
}
