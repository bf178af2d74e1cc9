// Request protocol object
//
// Represents an HTTP request. A navigation creates a Request; a redirect
// creates a new Request whose `redirectedFrom` points at the previous one,
// so a redirected navigation forms a chain ending at the request that
// produced the final Response.

use crate::error::Result;
use crate::protocol::ResponseObject;
use crate::server::channel_owner::{
    ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection, delegate_channel_owner_base,
    downcast,
};
use crate::server::message::GuidRef;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Converts the protocol's `[{name, value}]` header list into a map.
pub(crate) fn header_map(headers: Option<&Value>) -> HashMap<String, String> {
    headers
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|h| {
                    let name = h.get("name")?.as_str()?;
                    let value = h.get("value")?.as_str()?;
                    Some((name.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn guid_field(initializer: &Value, key: &str) -> Option<Arc<str>> {
    initializer
        .get(key)
        .and_then(|v| v.get("guid"))
        .and_then(|v| v.as_str())
        .map(Arc::from)
}

#[derive(Default)]
struct RequestLinks {
    redirected_to: Option<Arc<str>>,
    response: Option<Arc<str>>,
}

/// Request represents an HTTP request made by a frame.
///
/// See: <https://playwright.dev/docs/api/class-request>
#[derive(Clone)]
pub struct Request {
    base: ChannelOwnerImpl,
    redirected_from: Option<Arc<str>>,
    links: Arc<Mutex<RequestLinks>>,
}

impl Request {
    /// Creates a new Request from protocol initialization.
    ///
    /// When the request continues a redirect, the previous request learns
    /// about its successor here.
    pub fn new(
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Result<Self> {
        let redirected_from = guid_field(&initializer, "redirectedFrom");
        let connection = parent.connection();
        let base = ChannelOwnerImpl::new(parent, type_name, Arc::clone(&guid), initializer);

        if let Some(previous_guid) = &redirected_from {
            match connection
                .get_object(previous_guid)
                .and_then(|object| downcast::<Request>(&object))
            {
                Ok(previous) => previous.links.lock().redirected_to = Some(guid),
                Err(e) => tracing::warn!(
                    "Request {} redirected from unknown request {}: {}",
                    base.guid(),
                    previous_guid,
                    e
                ),
            }
        }

        Ok(Self {
            base,
            redirected_from,
            links: Arc::new(Mutex::new(RequestLinks::default())),
        })
    }

    pub fn guid(&self) -> &str {
        self.base.guid()
    }

    /// See: <https://playwright.dev/docs/api/class-request#request-url>
    pub fn url(&self) -> &str {
        self.base
            .initializer()
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    /// Returns the HTTP method of the request (GET, POST, etc.).
    pub fn method(&self) -> &str {
        self.base
            .initializer()
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
    }

    /// Returns the resource type of the request (e.g., "document", "script").
    pub fn resource_type(&self) -> &str {
        self.base
            .initializer()
            .get("resourceType")
            .and_then(|v| v.as_str())
            .unwrap_or("other")
    }

    pub fn headers(&self) -> HashMap<String, String> {
        header_map(self.base.initializer().get("headers"))
    }

    /// True when the request drives a frame navigation.
    pub fn is_navigation_request(&self) -> bool {
        self.base
            .initializer()
            .get("isNavigationRequest")
            .and_then(|v| v.as_bool())
            .unwrap_or_else(|| self.resource_type() == "document")
    }

    /// Guid of the frame that issued the request.
    pub fn frame_guid(&self) -> Option<Arc<str>> {
        guid_field(self.base.initializer(), "frame")
    }

    fn lookup(&self, guid: &str) -> Option<Request> {
        let object = self.base.connection().get_object(guid).ok()?;
        downcast::<Request>(&object).ok()
    }

    /// The request this one was redirected from, while it is still alive.
    ///
    /// See: <https://playwright.dev/docs/api/class-request#request-redirected-from>
    pub fn redirected_from(&self) -> Option<Request> {
        self.redirected_from.as_deref().and_then(|g| self.lookup(g))
    }

    /// The request the server redirected this one to, if any.
    pub fn redirected_to(&self) -> Option<Request> {
        let next = self.links.lock().redirected_to.clone()?;
        self.lookup(&next)
    }

    /// Every request of the redirect chain up to and including this one,
    /// oldest first.
    pub fn redirect_chain(&self) -> Vec<Request> {
        let mut chain = vec![self.clone()];
        while let Some(previous) = chain.last().and_then(Request::redirected_from) {
            chain.push(previous);
        }
        chain.reverse();
        chain
    }

    /// The last request of the redirect chain starting here.
    pub fn final_request(&self) -> Request {
        let mut current = self.clone();
        while let Some(next) = current.redirected_to() {
            current = next;
        }
        current
    }

    pub(crate) fn set_response(&self, guid: Arc<str>) {
        self.links.lock().response = Some(guid);
    }

    /// The response already received for this request, without a round trip.
    pub fn existing_response(&self) -> Option<ResponseObject> {
        let guid = self.links.lock().response.clone()?;
        let object = self.base.connection().get_object(&guid).ok()?;
        downcast::<ResponseObject>(&object).ok()
    }

    /// Returns the matching response, asking the driver if it has not been
    /// announced yet. `None` when the request failed or got no response.
    ///
    /// See: <https://playwright.dev/docs/api/class-request#request-response>
    pub async fn response(&self) -> Result<Option<ResponseObject>> {
        if let Some(response) = self.existing_response() {
            return Ok(Some(response));
        }

        #[derive(Deserialize)]
        struct ResponseResult {
            response: Option<GuidRef>,
        }

        self.base.ensure_alive()?;
        let result: ResponseResult = self.base.channel().send("response", json!({})).await?;
        let Some(reference) = result.response else {
            return Ok(None);
        };
        let object = self.base.connection().get_object(&reference.guid)?;
        let response = downcast::<ResponseObject>(&object)?;
        self.set_response(reference.guid);
        Ok(Some(response))
    }
}

impl ChannelOwner for Request {
    delegate_channel_owner_base!();

    fn on_event(&self, method: &str, params: Value) {
        self.base.on_event(method, params)
    }

    fn on_dispose(&self, reason: DisposeReason) {
        self.base.on_dispose(reason);
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("guid", &self.base.guid())
            .field("url", &self.url())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_skips_malformed_entries() {
        let headers = json!([
            {"name": "content-type", "value": "text/html"},
            {"name": "x-missing-value"},
            "junk"
        ]);
        let map = header_map(Some(&headers));
        assert_eq!(map.len(), 1);
        assert_eq!(map["content-type"], "text/html");
        assert!(header_map(None).is_empty());
    }
}
