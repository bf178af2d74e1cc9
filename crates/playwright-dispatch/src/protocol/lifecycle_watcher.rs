// Lifecycle watcher
//
// Decides when one navigation of one frame is finished, and how. The watcher
// itself is a plain state machine fed with FrameEvents; `wait` drives it from
// a frame subscription against a deadline.
//
// Rules:
// - The first navigation that starts (or the document id the driver reports
//   for `goto`) becomes the expected document. A navigation to any other
//   document before resolution cancels the watcher.
// - A commit keeping the initial document id completes as same-document,
//   unless a new document is expected.
// - Milestones only count once the new document has committed. A same-document
//   change inside that document leaves the commit and its milestones alone.
// - The first resolution wins; later events are ignored.

use crate::protocol::frame::FrameEvent;
use crate::protocol::navigation::{LoadState, UrlMatcher};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

/// Why a navigation was abandoned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// The frame was detached (or its page closed)
    FrameDetached,
    /// Another navigation started in the same frame
    Superseded { url: String },
    /// The driver reported the navigation failed
    Aborted(String),
    /// The connection closed
    Disconnected(String),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::FrameDetached => f.write_str("frame was detached"),
            CancelReason::Superseded { url } => {
                write!(f, "superseded by navigation to \"{url}\"")
            }
            CancelReason::Aborted(error) => write!(f, "navigation failed: {error}"),
            CancelReason::Disconnected(reason) => write!(f, "connection closed: {reason}"),
        }
    }
}

/// Terminal state of a watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The URL changed without loading a new document (fragment, History API)
    CompletedSameDocument,
    /// A new document committed and every required milestone fired.
    ///
    /// `request_guid` names the navigation request, when the driver sent one;
    /// the final response is found by following its redirects.
    CompletedNewDocument { request_guid: Option<Arc<str>> },
    TimedOut,
    Canceled(CancelReason),
}

#[derive(Debug)]
struct Commit {
    document_id: Option<String>,
    request_guid: Option<Arc<str>>,
}

/// Single-shot navigation state machine.
pub struct LifecycleWatcher {
    initial_document: Option<String>,
    expected_document: Option<String>,
    required: HashSet<LoadState>,
    url_matcher: Option<UrlMatcher>,
    commit: Option<Commit>,
    seen: HashSet<LoadState>,
    outcome: Option<NavigationOutcome>,
}

impl LifecycleWatcher {
    /// Creates a watcher for a frame currently showing `initial_document`.
    ///
    /// An empty `required` set resolves on commit.
    pub fn new(
        initial_document: Option<String>,
        required: impl IntoIterator<Item = LoadState>,
    ) -> Self {
        Self {
            initial_document,
            expected_document: None,
            required: required.into_iter().collect(),
            url_matcher: None,
            commit: None,
            seen: HashSet::new(),
            outcome: None,
        }
    }

    /// Only commits whose URL matches count.
    pub fn with_url_matcher(mut self, matcher: Option<UrlMatcher>) -> Self {
        self.url_matcher = matcher;
        self
    }

    /// Pins the document the navigation is expected to produce.
    ///
    /// A commit already recorded for a different document is forgotten.
    pub fn expect_document(&mut self, document_id: &str) {
        if self.outcome.is_some() {
            return;
        }
        if let Some(commit) = &self.commit
            && commit.document_id.as_deref().is_some_and(|id| id != document_id)
        {
            self.commit = None;
            self.seen.clear();
        }
        self.expected_document = Some(document_id.to_string());
    }

    pub fn expected_document(&self) -> Option<&str> {
        self.expected_document.as_deref()
    }

    pub fn outcome(&self) -> Option<&NavigationOutcome> {
        self.outcome.as_ref()
    }

    /// Feeds one event. Returns the outcome the first time the watcher
    /// resolves and `None` otherwise.
    pub fn on_event(&mut self, event: &FrameEvent) -> Option<NavigationOutcome> {
        if self.outcome.is_some() {
            return None;
        }

        let resolved = match event {
            FrameEvent::NavigationStarted { document_id, url } => {
                self.on_navigation_started(document_id, url)
            }
            FrameEvent::Committed {
                url,
                document_id,
                new_document,
                request_guid,
                error,
                ..
            } => self.on_commit(
                url,
                document_id.as_deref(),
                *new_document,
                request_guid,
                error.as_deref(),
            ),
            FrameEvent::LoadState { state, added } => {
                if self.commit.is_none() {
                    None
                } else {
                    if *added {
                        self.seen.insert(*state);
                    } else {
                        self.seen.remove(state);
                    }
                    self.check_ready()
                }
            }
            FrameEvent::Detached => Some(NavigationOutcome::Canceled(CancelReason::FrameDetached)),
            FrameEvent::Disconnected(reason) => Some(NavigationOutcome::Canceled(
                CancelReason::Disconnected(reason.clone()),
            )),
        };

        if let Some(outcome) = &resolved {
            tracing::debug!("Navigation watcher resolved: {:?}", outcome);
            self.outcome = Some(outcome.clone());
        }
        resolved
    }

    /// Resolves as timed out unless already resolved.
    pub fn on_timeout(&mut self) -> Option<NavigationOutcome> {
        if self.outcome.is_some() {
            return None;
        }
        self.outcome = Some(NavigationOutcome::TimedOut);
        self.outcome.clone()
    }

    fn accepts(&self, url: &str) -> bool {
        self.url_matcher.as_ref().is_none_or(|m| m.matches(url))
    }

    fn on_navigation_started(&mut self, document_id: &str, url: &str) -> Option<NavigationOutcome> {
        match &self.expected_document {
            Some(expected) if expected == document_id => None,
            Some(_) => Some(NavigationOutcome::Canceled(CancelReason::Superseded {
                url: url.to_string(),
            })),
            None => {
                if self.accepts(url) {
                    self.expected_document = Some(document_id.to_string());
                }
                None
            }
        }
    }

    fn on_commit(
        &mut self,
        url: &str,
        document_id: Option<&str>,
        new_document: bool,
        request_guid: &Option<Arc<str>>,
        error: Option<&str>,
    ) -> Option<NavigationOutcome> {
        let ours = match (&self.expected_document, document_id) {
            (Some(expected), Some(id)) => expected == id,
            _ => true,
        };

        if let Some(error) = error {
            return ours.then(|| NavigationOutcome::Canceled(CancelReason::Aborted(error.to_string())));
        }
        // History API or fragment change inside the document already committed
        if let Some(commit) = &self.commit
            && !new_document
            && document_id.is_none_or(|id| commit.document_id.as_deref() == Some(id))
        {
            return None;
        }
        if !self.accepts(url) {
            return None;
        }

        let is_new = new_document
            || document_id.is_some_and(|id| Some(id) != self.initial_document.as_deref());
        if !is_new {
            return match self.expected_document {
                Some(_) => None,
                None => Some(NavigationOutcome::CompletedSameDocument),
            };
        }

        if !ours {
            return Some(NavigationOutcome::Canceled(CancelReason::Superseded {
                url: url.to_string(),
            }));
        }

        if let Some(id) = document_id {
            self.expected_document = Some(id.to_string());
        }
        self.commit = Some(Commit {
            document_id: document_id.map(str::to_string),
            request_guid: request_guid.clone(),
        });
        self.seen.clear();
        self.check_ready()
    }

    fn check_ready(&self) -> Option<NavigationOutcome> {
        let commit = self.commit.as_ref()?;
        self.required
            .is_subset(&self.seen)
            .then(|| NavigationOutcome::CompletedNewDocument {
                request_guid: commit.request_guid.clone(),
            })
    }

    /// Drives the watcher from `events` until it resolves or `deadline`
    /// passes. Events already queued win over an expired deadline.
    pub async fn wait(
        &mut self,
        events: &mut UnboundedReceiver<FrameEvent>,
        deadline: Option<Instant>,
    ) -> NavigationOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        loop {
            tokio::select! {
                biased;
                event = events.recv() => {
                    let event = event.unwrap_or(FrameEvent::Detached);
                    if let Some(outcome) = self.on_event(&event) {
                        return outcome;
                    }
                }
                _ = sleep_until(deadline) => {
                    if let Some(outcome) = self.on_timeout() {
                        return outcome;
                    }
                }
            }
        }
    }
}

/// Sleeps until `deadline`; never completes without one.
pub(crate) async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
