// Page protocol object
//
// Represents a web page within a browser context. Navigation is delegated to
// the main frame; the page owns the settings its frames share (timeouts,
// extra HTTP headers) and tracks which frames are attached.

use crate::error::{Error, Result};
use crate::protocol::js_value::JsValue;
use crate::protocol::navigation::{GotoOptions, LoadState, WaitForNavigationOptions};
use crate::protocol::timeout_settings::TimeoutSettings;
use crate::protocol::{Frame, ResponseObject};
use crate::server::channel_owner::{
    ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection, delegate_channel_owner_base,
    downcast,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

struct PageState {
    main_frame: Arc<str>,
    frames: Mutex<Vec<Arc<str>>>,
    timeouts: Arc<TimeoutSettings>,
    /// Keys are lower-cased
    extra_http_headers: Mutex<HashMap<String, String>>,
    closed: AtomicBool,
}

/// Page represents a web page within a browser context.
///
/// Initially, pages are navigated to "about:blank". Use [`Page::goto`] to
/// navigate to URLs.
///
/// See: <https://playwright.dev/docs/api/class-page>
#[derive(Clone)]
pub struct Page {
    base: ChannelOwnerImpl,
    state: Arc<PageState>,
}

impl Page {
    /// Creates a new Page from protocol initialization.
    ///
    /// The main frame named by the initializer must already exist.
    pub fn new(
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Result<Self> {
        let main_frame_guid: Arc<str> = initializer
            .get("mainFrame")
            .and_then(|v| v.get("guid"))
            .and_then(|v| v.as_str())
            .map(Arc::from)
            .ok_or_else(|| Error::ProtocolError(format!("Page {} has no mainFrame", guid)))?;

        let connection = parent.connection();
        let main_frame = downcast::<Frame>(&connection.get_object(&main_frame_guid)?)?;

        let timeouts = Arc::new(TimeoutSettings::new());
        main_frame.attach_to_page(Arc::clone(&guid), Arc::clone(&timeouts));

        let base = ChannelOwnerImpl::new(parent, type_name, guid, initializer);
        Ok(Self {
            base,
            state: Arc::new(PageState {
                frames: Mutex::new(vec![Arc::clone(&main_frame_guid)]),
                main_frame: main_frame_guid,
                timeouts,
                extra_http_headers: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn guid(&self) -> &str {
        self.base.guid()
    }

    /// See: <https://playwright.dev/docs/api/class-page#page-main-frame>
    pub fn main_frame(&self) -> Result<Frame> {
        let object = self.base.connection().get_object(&self.state.main_frame)?;
        downcast::<Frame>(&object)
    }

    /// Every attached frame, main frame first.
    ///
    /// See: <https://playwright.dev/docs/api/class-page#page-frames>
    pub fn frames(&self) -> Vec<Frame> {
        let connection = self.base.connection();
        let guids = self.state.frames.lock().clone();
        guids
            .iter()
            .filter_map(|guid| connection.get_object(guid).ok())
            .filter_map(|object| downcast::<Frame>(&object).ok())
            .collect()
    }

    /// Returns the URL of the main frame.
    ///
    /// See: <https://playwright.dev/docs/api/class-page#page-url>
    pub fn url(&self) -> String {
        self.main_frame()
            .map(|frame| frame.url())
            .unwrap_or_else(|_| "about:blank".to_string())
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Navigates the main frame.
    ///
    /// Returns `None` when navigating to URLs that don't produce responses (e.g., data URLs,
    /// about:blank) and for same-document navigations.
    ///
    /// See: <https://playwright.dev/docs/api/class-page#page-goto>
    pub async fn goto(&self, url: &str, options: Option<GotoOptions>) -> Result<Option<ResponseObject>> {
        self.main_frame()?.goto(url, options).await
    }

    /// See: <https://playwright.dev/docs/api/class-page#page-wait-for-navigation>
    pub async fn wait_for_navigation(
        &self,
        options: Option<WaitForNavigationOptions>,
    ) -> Result<Option<ResponseObject>> {
        self.main_frame()?.wait_for_navigation(options).await
    }

    /// See: <https://playwright.dev/docs/api/class-page#page-wait-for-load-state>
    pub async fn wait_for_load_state(
        &self,
        state: Option<LoadState>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.main_frame()?.wait_for_load_state(state, timeout).await
    }

    /// See: <https://playwright.dev/docs/api/class-page#page-evaluate>
    pub async fn evaluate<T: DeserializeOwned>(
        &self,
        expression: &str,
        arg: Option<&JsValue>,
    ) -> Result<T> {
        self.main_frame()?.evaluate(expression, arg).await
    }

    pub async fn evaluate_expression(
        &self,
        expression: &str,
        arg: Option<&JsValue>,
    ) -> Result<JsValue> {
        self.main_frame()?.evaluate_expression(expression, arg).await
    }

    /// Applies to every wait on this page that has no explicit timeout.
    ///
    /// See: <https://playwright.dev/docs/api/class-page#page-set-default-timeout>
    pub fn set_default_timeout(&self, timeout: Duration) {
        self.state.timeouts.set_default_timeout(timeout);
    }

    /// See: <https://playwright.dev/docs/api/class-page#page-set-default-navigation-timeout>
    pub fn set_default_navigation_timeout(&self, timeout: Duration) {
        self.state.timeouts.set_default_navigation_timeout(timeout);
    }

    /// Sends `headers` with every request the page makes.
    ///
    /// See: <https://playwright.dev/docs/api/class-page#page-set-extra-http-headers>
    pub async fn set_extra_http_headers(&self, headers: HashMap<String, String>) -> Result<()> {
        self.base.ensure_alive()?;
        let list: Vec<Value> = headers
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        self.base
            .channel()
            .send_no_result("setExtraHTTPHeaders", json!({ "headers": list }))
            .await?;

        *self.state.extra_http_headers.lock() = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Ok(())
    }

    /// Looks up an extra HTTP header by case-insensitive name.
    pub fn extra_http_header(&self, name: &str) -> Option<String> {
        self.state
            .extra_http_headers
            .lock()
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Closes the page.
    ///
    /// See: <https://playwright.dev/docs/api/class-page#page-close>
    pub async fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.base.channel().send_no_result("close", json!({})).await
    }

    fn frame_from_event(&self, params: &Value) -> Option<Frame> {
        let guid = params.get("frame")?.get("guid")?.as_str()?;
        match self
            .base
            .connection()
            .get_object(guid)
            .and_then(|object| downcast::<Frame>(&object))
        {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!("Page {} event names unknown frame {}: {}", self.guid(), guid, e);
                None
            }
        }
    }

    fn mark_closed(&self) {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for frame in self.frames() {
            frame.mark_detached();
        }
    }
}

impl ChannelOwner for Page {
    delegate_channel_owner_base!();

    fn on_event(&self, method: &str, params: Value) {
        match method {
            "frameAttached" => {
                if let Some(frame) = self.frame_from_event(&params) {
                    frame.attach_to_page(self.base.guid_arc(), Arc::clone(&self.state.timeouts));
                    let mut frames = self.state.frames.lock();
                    if !frames.iter().any(|g| g.as_ref() == frame.guid()) {
                        frames.push(Arc::from(frame.guid()));
                    }
                }
            }
            "frameDetached" => {
                if let Some(frame) = self.frame_from_event(&params) {
                    self.state
                        .frames
                        .lock()
                        .retain(|g| g.as_ref() != frame.guid());
                    frame.mark_detached();
                }
            }
            "close" => self.mark_closed(),
            _ => self.base.on_event(method, params),
        }
    }

    fn on_dispose(&self, reason: DisposeReason) {
        self.base.on_dispose(reason);
        self.mark_closed();
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("guid", &self.guid())
            .field("main_frame", &self.state.main_frame)
            .field("closed", &self.is_closed())
            .finish()
    }
}
