// JSHandle protocol object
//
// A reference to a value living in the page. ElementHandle shares this proxy;
// `is_element()` tells them apart.

use crate::error::{Error, Result};
use crate::protocol::evaluate_conversion::{parse_result, serialize_argument, serialize_null};
use crate::protocol::js_value::{JsValue, from_js_value};
use crate::server::channel_owner::{
    ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection, delegate_channel_owner_base,
    downcast,
};
use crate::server::connection::ConnectionLike;
use crate::server::message::GuidRef;
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Matches arrow functions such as `x => ...`, `(a, b) => ...` or `async () => ...`
static ARROW_FUNCTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(async\s+)?(\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>").ok());

/// True when `expression` reads as a function rather than a plain expression.
///
/// Decides the `isFunction` flag sent with evaluate calls.
pub fn is_function_expression(expression: &str) -> bool {
    let trimmed = expression.trim_start();
    trimmed.starts_with("function")
        || trimmed.starts_with("async function")
        || ARROW_FUNCTION
            .as_ref()
            .is_some_and(|re| re.is_match(trimmed))
}

#[derive(Deserialize)]
pub(crate) struct HandleResult {
    pub(crate) handle: GuidRef,
}

/// Handle to an in-page value.
///
/// See: <https://playwright.dev/docs/api/class-jshandle>
#[derive(Clone)]
pub struct JsHandle {
    base: ChannelOwnerImpl,
    preview: Arc<Mutex<String>>,
}

impl JsHandle {
    pub fn new(
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Result<Self> {
        let preview = initializer
            .get("preview")
            .and_then(|v| v.as_str())
            .unwrap_or("JSHandle@object")
            .to_string();

        let base = ChannelOwnerImpl::new(parent, type_name, guid, initializer);
        Ok(Self {
            base,
            preview: Arc::new(Mutex::new(preview)),
        })
    }

    pub fn guid(&self) -> &str {
        self.base.guid()
    }

    pub fn guid_arc(&self) -> Arc<str> {
        self.base.guid_arc()
    }

    /// True for handles the driver created as `ElementHandle`.
    pub fn is_element(&self) -> bool {
        self.base.type_name() == "ElementHandle"
    }

    /// Short description of the value, kept current by `previewUpdated`.
    pub fn preview(&self) -> String {
        self.preview.lock().clone()
    }

    /// Evaluates `expression` with this handle as its first argument.
    ///
    /// See: <https://playwright.dev/docs/api/class-jshandle#js-handle-evaluate>
    pub async fn evaluate(&self, expression: &str, arg: Option<&JsValue>) -> Result<JsValue> {
        self.base.ensure_alive()?;
        let result: Value = self
            .base
            .channel()
            .send("evaluateExpression", evaluate_params(expression, arg))
            .await?;
        parse_result(&self.base.connection(), &result)
    }

    /// Like [`evaluate`](Self::evaluate), deserializing the result into `T`.
    pub async fn evaluate_into<T: DeserializeOwned>(
        &self,
        expression: &str,
        arg: Option<&JsValue>,
    ) -> Result<T> {
        from_js_value(self.evaluate(expression, arg).await?)
    }

    /// Evaluates `expression` and returns the result as a new handle.
    pub async fn evaluate_handle(&self, expression: &str, arg: Option<&JsValue>) -> Result<JsHandle> {
        self.base.ensure_alive()?;
        let result: HandleResult = self
            .base
            .channel()
            .send("evaluateExpressionHandle", evaluate_params(expression, arg))
            .await?;
        handle_from_guid(&self.base.connection(), &result.handle.guid)
    }

    /// Returns a JSON-like copy of the referenced value.
    ///
    /// See: <https://playwright.dev/docs/api/class-jshandle#js-handle-json-value>
    pub async fn json_value(&self) -> Result<JsValue> {
        self.base.ensure_alive()?;
        let result: Value = self.base.channel().send("jsonValue", json!({})).await?;
        parse_result(&self.base.connection(), &result)
    }

    /// Returns a handle to one property of the referenced value.
    pub async fn get_property(&self, name: &str) -> Result<JsHandle> {
        self.base.ensure_alive()?;
        let result: HandleResult = self
            .base
            .channel()
            .send("getProperty", json!({ "name": name }))
            .await?;
        handle_from_guid(&self.base.connection(), &result.handle.guid)
    }

    /// Returns handles to every own property of the referenced value.
    pub async fn get_properties(&self) -> Result<HashMap<String, JsHandle>> {
        #[derive(Deserialize)]
        struct Property {
            name: String,
            value: GuidRef,
        }

        #[derive(Deserialize)]
        struct PropertyList {
            properties: Vec<Property>,
        }

        self.base.ensure_alive()?;
        let result: PropertyList = self
            .base
            .channel()
            .send("getPropertyList", json!({}))
            .await?;

        let connection = self.base.connection();
        result
            .properties
            .into_iter()
            .map(|p| Ok((p.name, handle_from_guid(&connection, &p.value.guid)?)))
            .collect()
    }

    /// Releases the remote value and removes the handle from the tree.
    ///
    /// Disposing twice is a no-op.
    pub async fn dispose(&self) -> Result<()> {
        if self.base.is_disposed() {
            return Ok(());
        }
        self.base.channel().send_no_result("dispose", json!({})).await?;
        self.base
            .connection()
            .dispose_object(self.base.guid(), DisposeReason::Closed);
        Ok(())
    }
}

pub(crate) fn evaluate_params(expression: &str, arg: Option<&JsValue>) -> Value {
    let arg = match arg {
        Some(value) => serialize_argument(value),
        None => serialize_null(),
    };
    json!({
        "expression": expression,
        "isFunction": is_function_expression(expression),
        "arg": arg,
    })
}

pub(crate) fn handle_from_guid(
    connection: &Arc<dyn ConnectionLike>,
    guid: &str,
) -> Result<JsHandle> {
    let object = connection.get_object(guid)?;
    downcast::<JsHandle>(&object).map_err(|_| {
        Error::ProtocolError(format!(
            "Expected a JSHandle for {}, got {}",
            guid,
            object.type_name()
        ))
    })
}

impl ChannelOwner for JsHandle {
    delegate_channel_owner_base!();

    fn on_event(&self, method: &str, params: Value) {
        match method {
            "previewUpdated" => {
                if let Some(preview) = params.get("preview").and_then(|v| v.as_str()) {
                    *self.preview.lock() = preview.to_string();
                }
            }
            _ => self.base.on_event(method, params),
        }
    }

    fn on_dispose(&self, reason: DisposeReason) {
        self.base.on_dispose(reason);
    }
}

impl std::fmt::Debug for JsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsHandle")
            .field("guid", &self.base.guid())
            .field("preview", &self.preview())
            .finish()
    }
}
