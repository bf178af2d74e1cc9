// Frame protocol object
//
// Represents a frame within a page. Pages have a main frame, and can have child frames (iframes).
// Navigation happens on frames, not directly on pages.
//
// Wire events are decoded once into FrameEvent and fanned out to subscribers;
// navigation waiters each hold their own subscription.

use crate::error::{Error, Result};
use crate::protocol::evaluate_conversion::parse_result;
use crate::protocol::js_handle::{HandleResult, evaluate_params, handle_from_guid};
use crate::protocol::js_value::{JsValue, from_js_value};
use crate::protocol::lifecycle_watcher::{
    CancelReason, LifecycleWatcher, NavigationOutcome, sleep_until,
};
use crate::protocol::navigation::{GotoOptions, LoadState, WaitForNavigationOptions};
use crate::protocol::timeout_settings::TimeoutSettings;
use crate::protocol::{JsHandle, Page, Request, ResponseObject};
use crate::server::channel_owner::{
    ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection, delegate_channel_owner_base,
    downcast,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

/// Navigation-related events of one frame, decoded from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A navigation request was issued for a new document
    NavigationStarted { document_id: String, url: String },
    /// A navigation committed, or failed to
    Committed {
        url: String,
        name: String,
        document_id: Option<String>,
        /// True when a new document was loaded
        new_document: bool,
        /// The navigation request of a new document
        request_guid: Option<Arc<str>>,
        error: Option<String>,
    },
    /// A lifecycle milestone was reached (`added`) or reset
    LoadState { state: LoadState, added: bool },
    Detached,
    /// The connection closed; carries the close reason
    Disconnected(String),
}

fn guid_at(value: &Value, key: &str) -> Option<Arc<str>> {
    value
        .get(key)
        .and_then(|v| v.get("guid"))
        .and_then(|v| v.as_str())
        .map(Arc::from)
}

fn str_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

#[derive(Debug)]
struct FrameData {
    url: String,
    name: String,
    document_id: Option<String>,
    load_states: HashSet<LoadState>,
}

struct FrameState {
    data: Mutex<FrameData>,
    subscribers: Mutex<Subscribers>,
    page: Mutex<Option<Arc<str>>>,
    timeouts: Mutex<Arc<TimeoutSettings>>,
    parent_frame: Option<Arc<str>>,
}

#[derive(Default)]
struct Subscribers {
    senders: Vec<UnboundedSender<FrameEvent>>,
    detached: bool,
    disconnected: Option<String>,
}

impl Subscribers {
    fn emit(&mut self, event: FrameEvent) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Frame represents a frame within a page.
///
/// Every page has a main frame, and pages can have additional child frames (iframes).
///
/// See: <https://playwright.dev/docs/api/class-frame>
#[derive(Clone)]
pub struct Frame {
    base: ChannelOwnerImpl,
    state: Arc<FrameState>,
}

impl Frame {
    /// Creates a new Frame from protocol initialization
    ///
    /// The frame uses default timeouts until a page adopts it.
    pub fn new(
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Result<Self> {
        let load_states = initializer
            .get("loadStates")
            .and_then(|v| v.as_array())
            .map(|states| {
                states
                    .iter()
                    .filter_map(|s| s.as_str().and_then(LoadState::from_tag))
                    .collect()
            })
            .unwrap_or_default();

        let data = FrameData {
            url: str_at(&initializer, "url").unwrap_or_else(|| "about:blank".to_string()),
            name: str_at(&initializer, "name").unwrap_or_default(),
            document_id: str_at(&initializer, "documentId"),
            load_states,
        };
        let parent_frame = guid_at(&initializer, "parentFrame");

        let base = ChannelOwnerImpl::new(parent, type_name, guid, initializer);
        Ok(Self {
            base,
            state: Arc::new(FrameState {
                data: Mutex::new(data),
                subscribers: Mutex::new(Subscribers::default()),
                page: Mutex::new(None),
                timeouts: Mutex::new(Arc::new(TimeoutSettings::new())),
                parent_frame,
            }),
        })
    }

    pub fn guid(&self) -> &str {
        self.base.guid()
    }

    /// Returns the last committed URL of the frame.
    ///
    /// See: <https://playwright.dev/docs/api/class-frame#frame-url>
    pub fn url(&self) -> String {
        self.state.data.lock().url.clone()
    }

    /// See: <https://playwright.dev/docs/api/class-frame#frame-name>
    pub fn name(&self) -> String {
        self.state.data.lock().name.clone()
    }

    /// Id of the document currently loaded in the frame, if the driver reported one.
    pub fn document_id(&self) -> Option<String> {
        self.state.data.lock().document_id.clone()
    }

    /// Milestones that have fired for the current document.
    pub fn load_states(&self) -> HashSet<LoadState> {
        self.state.data.lock().load_states.clone()
    }

    /// See: <https://playwright.dev/docs/api/class-frame#frame-is-detached>
    pub fn is_detached(&self) -> bool {
        self.state.subscribers.lock().detached
    }

    /// See: <https://playwright.dev/docs/api/class-frame#frame-parent-frame>
    pub fn parent_frame(&self) -> Option<Frame> {
        let guid = self.state.parent_frame.as_deref()?;
        let object = self.base.connection().get_object(guid).ok()?;
        downcast::<Frame>(&object).ok()
    }

    /// See: <https://playwright.dev/docs/api/class-frame#frame-child-frames>
    pub fn child_frames(&self) -> Vec<Frame> {
        let Some(page) = self.page() else {
            return Vec::new();
        };
        page.frames()
            .into_iter()
            .filter(|f| f.state.parent_frame.as_deref() == Some(self.guid()))
            .collect()
    }

    /// The page this frame belongs to, once the page has announced it.
    pub fn page(&self) -> Option<Page> {
        let guid = self.state.page.lock().clone()?;
        let object = self.base.connection().get_object(&guid).ok()?;
        downcast::<Page>(&object).ok()
    }

    pub(crate) fn attach_to_page(&self, page_guid: Arc<str>, timeouts: Arc<TimeoutSettings>) {
        *self.state.page.lock() = Some(page_guid);
        *self.state.timeouts.lock() = timeouts;
    }

    fn timeouts(&self) -> Arc<TimeoutSettings> {
        Arc::clone(&self.state.timeouts.lock())
    }

    /// Opens a new event subscription.
    ///
    /// A frame that is already detached, or whose connection already closed,
    /// reports so on the new subscription right away.
    pub fn subscribe(&self) -> UnboundedReceiver<FrameEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.state.subscribers.lock();
        if let Some(reason) = &subscribers.disconnected {
            let _ = tx.send(FrameEvent::Disconnected(reason.clone()));
        }
        if subscribers.detached {
            let _ = tx.send(FrameEvent::Detached);
        }
        subscribers.senders.push(tx);
        rx
    }

    pub(crate) fn mark_detached(&self) {
        let mut subscribers = self.state.subscribers.lock();
        if subscribers.detached {
            return;
        }
        subscribers.detached = true;
        subscribers.emit(FrameEvent::Detached);
    }

    fn emit(&self, event: FrameEvent) {
        self.state.subscribers.lock().emit(event);
    }

    fn resolve_referer(&self, option: Option<&str>) -> Result<Option<String>> {
        let header = self
            .page()
            .and_then(|page| page.extra_http_header("referer"));
        match (header, option) {
            (Some(header), Some(option)) if header != option => Err(Error::InvalidArgument(
                "\"referer\" is already specified as extra HTTP header".to_string(),
            )),
            (_, Some(option)) => Ok(Some(option.to_string())),
            (header, None) => Ok(header),
        }
    }

    /// Navigates the frame to the specified URL.
    ///
    /// Returns the response of the last request in the redirect chain, or
    /// `None` for same-document navigations and URLs that produce no
    /// response (about:blank, data URLs).
    ///
    /// See: <https://playwright.dev/docs/api/class-frame#frame-goto>
    pub async fn goto(&self, url: &str, options: Option<GotoOptions>) -> Result<Option<ResponseObject>> {
        let options = options.unwrap_or_default();
        self.base.ensure_alive()?;
        url::Url::parse(url)
            .map_err(|e| Error::InvalidArgument(format!("Invalid URL \"{url}\": {e}")))?;
        let referer = self.resolve_referer(options.referer.as_deref())?;

        let wait_until = options.wait_until.unwrap_or_default();
        let timeout = self.timeouts().navigation_timeout(options.timeout);
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut params = json!({
            "url": url,
            "waitUntil": wait_until.as_str(),
            "timeout": timeout.map_or(0, |t| t.as_millis() as u64),
        });
        if let Some(referer) = referer {
            params["referer"] = json!(referer);
        }

        // Subscribe before sending so no event of this navigation is missed
        let mut events = self.subscribe();
        let mut watcher = LifecycleWatcher::new(self.document_id(), wait_until.milestone());

        let call = self.base.channel().send::<_, Value>("goto", params);
        tokio::pin!(call);

        let result = loop {
            tokio::select! {
                biased;
                result = &mut call => break result?,
                event = events.recv() => {
                    let event = event.unwrap_or(FrameEvent::Detached);
                    if let Some(outcome) = watcher.on_event(&event)
                        && !matches!(
                            outcome,
                            NavigationOutcome::CompletedSameDocument
                                | NavigationOutcome::CompletedNewDocument { .. }
                        )
                    {
                        return Err(navigation_error(url, outcome, timeout));
                    }
                }
                _ = sleep_until(deadline) => {
                    return Err(navigation_error(url, NavigationOutcome::TimedOut, timeout));
                }
            }
        };

        if let Some(document_id) = result.get("newDocumentId").and_then(|v| v.as_str()) {
            watcher.expect_document(document_id);
        }

        match watcher.wait(&mut events, deadline).await {
            NavigationOutcome::CompletedSameDocument => Ok(None),
            NavigationOutcome::CompletedNewDocument { request_guid } => {
                if url.starts_with("about:") || url.starts_with("data:") {
                    return Ok(None);
                }
                self.navigation_response(request_guid, guid_at(&result, "response"))
                    .await
            }
            outcome => Err(navigation_error(url, outcome, timeout)),
        }
    }

    /// Waits for the next navigation of this frame to finish.
    ///
    /// With a URL matcher, only navigations committing a matching URL count.
    ///
    /// See: <https://playwright.dev/docs/api/class-frame#frame-wait-for-navigation>
    pub async fn wait_for_navigation(
        &self,
        options: Option<WaitForNavigationOptions>,
    ) -> Result<Option<ResponseObject>> {
        let options = options.unwrap_or_default();
        self.base.ensure_alive()?;
        let wait_until = options.wait_until.unwrap_or_default();
        let timeout = self.timeouts().navigation_timeout(options.timeout);
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut events = self.subscribe();
        let mut watcher = LifecycleWatcher::new(self.document_id(), wait_until.milestone())
            .with_url_matcher(options.url);

        match watcher.wait(&mut events, deadline).await {
            NavigationOutcome::CompletedSameDocument => Ok(None),
            NavigationOutcome::CompletedNewDocument { request_guid } => {
                self.navigation_response(request_guid, None).await
            }
            outcome => Err(navigation_error(&self.url(), outcome, timeout)),
        }
    }

    /// Waits until `state` has fired for the current document.
    ///
    /// Resolves immediately if it already has.
    ///
    /// See: <https://playwright.dev/docs/api/class-frame#frame-wait-for-load-state>
    pub async fn wait_for_load_state(
        &self,
        state: Option<LoadState>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let state = state.unwrap_or(LoadState::Load);
        let mut events = self.subscribe();
        if self.state.data.lock().load_states.contains(&state) {
            return Ok(());
        }

        let timeout = self.timeouts().navigation_timeout(timeout);
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event.unwrap_or(FrameEvent::Detached) {
                    FrameEvent::LoadState { state: fired, added: true } if fired == state => {
                        return Ok(());
                    }
                    FrameEvent::Detached => {
                        return Err(Error::TargetClosed {
                            target_type: "Frame".to_string(),
                            context: format!("Frame was detached while waiting for \"{}\"", state.as_str()),
                        });
                    }
                    FrameEvent::Disconnected(reason) => return Err(Error::Disconnected(reason)),
                    _ => {}
                },
                _ = sleep_until(deadline) => {
                    return Err(Error::Timeout(format!(
                        "Timeout {}ms exceeded waiting for load state \"{}\"",
                        timeout.map_or(0, |t| t.as_millis()),
                        state.as_str()
                    )));
                }
            }
        }
    }

    async fn navigation_response(
        &self,
        request_guid: Option<Arc<str>>,
        reported: Option<Arc<str>>,
    ) -> Result<Option<ResponseObject>> {
        let connection = self.base.connection();
        if let Some(guid) = request_guid {
            let request = downcast::<Request>(&connection.get_object(&guid)?)?;
            return request.final_request().response().await;
        }
        match reported {
            Some(guid) => Ok(Some(downcast::<ResponseObject>(
                &connection.get_object(&guid)?,
            )?)),
            None => Ok(None),
        }
    }

    /// Evaluates `expression` in the frame and returns the decoded result.
    ///
    /// See: <https://playwright.dev/docs/api/class-frame#frame-evaluate>
    pub async fn evaluate_expression(
        &self,
        expression: &str,
        arg: Option<&JsValue>,
    ) -> Result<JsValue> {
        self.base.ensure_alive()?;
        let result: Value = self
            .base
            .channel()
            .send("evaluateExpression", evaluate_params(expression, arg))
            .await?;
        parse_result(&self.base.connection(), &result)
    }

    /// Like [`evaluate_expression`](Self::evaluate_expression), deserializing into `T`.
    pub async fn evaluate<T: DeserializeOwned>(
        &self,
        expression: &str,
        arg: Option<&JsValue>,
    ) -> Result<T> {
        from_js_value(self.evaluate_expression(expression, arg).await?)
    }

    /// See: <https://playwright.dev/docs/api/class-frame#frame-evaluate-handle>
    pub async fn evaluate_expression_handle(
        &self,
        expression: &str,
        arg: Option<&JsValue>,
    ) -> Result<JsHandle> {
        self.base.ensure_alive()?;
        let result: HandleResult = self
            .base
            .channel()
            .send("evaluateExpressionHandle", evaluate_params(expression, arg))
            .await?;
        handle_from_guid(&self.base.connection(), &result.handle.guid)
    }

    fn on_navigated(&self, params: &Value) -> FrameEvent {
        let new_document = params.get("newDocument").filter(|v| v.is_object());
        let request_guid = new_document.and_then(|doc| guid_at(doc, "request"));
        let error = str_at(params, "error");
        let url = str_at(params, "url").unwrap_or_default();
        let name = str_at(params, "name").unwrap_or_default();

        let mut data = self.state.data.lock();
        let document_id = str_at(params, "documentId")
            .or_else(|| new_document.and_then(|doc| str_at(doc, "documentId")))
            .or_else(|| {
                new_document
                    .is_none()
                    .then(|| data.document_id.clone())
                    .flatten()
            });

        if error.is_none() {
            data.url = url.clone();
            data.name = name.clone();
            if new_document.is_some() {
                data.load_states.clear();
                if document_id.is_some() {
                    data.document_id = document_id.clone();
                }
            }
        }

        FrameEvent::Committed {
            url,
            name,
            document_id,
            new_document: new_document.is_some(),
            request_guid,
            error,
        }
    }

    fn on_load_state(&self, params: &Value) -> Option<FrameEvent> {
        let (tag, added) = match (str_at(params, "add"), str_at(params, "remove")) {
            (Some(tag), _) => (tag, true),
            (None, Some(tag)) => (tag, false),
            (None, None) => return None,
        };
        let state = LoadState::from_tag(&tag)?;

        let mut data = self.state.data.lock();
        if added {
            data.load_states.insert(state);
        } else {
            data.load_states.remove(&state);
        }
        Some(FrameEvent::LoadState { state, added })
    }
}

fn navigation_error(url: &str, outcome: NavigationOutcome, timeout: Option<Duration>) -> Error {
    match outcome {
        NavigationOutcome::TimedOut => Error::NavigationTimeout {
            url: url.to_string(),
            duration_ms: timeout.map_or(0, |t| t.as_millis() as u64),
        },
        NavigationOutcome::Canceled(CancelReason::Disconnected(reason)) => {
            Error::Disconnected(reason)
        }
        NavigationOutcome::Canceled(reason) => Error::NavigationCanceled {
            url: url.to_string(),
            reason: reason.to_string(),
        },
        completed => Error::ProtocolError(format!("Unexpected navigation outcome {completed:?}")),
    }
}

impl ChannelOwner for Frame {
    delegate_channel_owner_base!();

    fn on_event(&self, method: &str, params: Value) {
        match method {
            "navigationStarted" => {
                let (Some(document_id), Some(url)) =
                    (str_at(&params, "documentId"), str_at(&params, "url"))
                else {
                    tracing::warn!("Malformed navigationStarted on {}: {:?}", self.guid(), params);
                    return;
                };
                self.emit(FrameEvent::NavigationStarted { document_id, url });
            }
            "navigated" => {
                let event = self.on_navigated(&params);
                self.emit(event);
            }
            "loadstate" => {
                if let Some(event) = self.on_load_state(&params) {
                    self.emit(event);
                }
            }
            "detached" => self.mark_detached(),
            _ => self.base.on_event(method, params),
        }
    }

    fn on_dispose(&self, reason: DisposeReason) {
        self.base.on_dispose(reason);
        self.mark_detached();
    }

    fn on_disconnect(&self, reason: &str) {
        let mut subscribers = self.state.subscribers.lock();
        if subscribers.disconnected.is_none() {
            subscribers.disconnected = Some(reason.to_string());
            subscribers.emit(FrameEvent::Disconnected(reason.to_string()));
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("guid", &self.guid())
            .field("url", &self.url())
            .field("detached", &self.is_detached())
            .finish()
    }
}
