// Navigation options and lifecycle milestones

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle milestones a frame reports through `loadstate` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// The `load` event fired
    Load,
    /// The `DOMContentLoaded` event fired
    DomContentLoaded,
    /// No network connections for at least 500ms
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }

    /// Decodes the protocol tag; unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "load" => Some(LoadState::Load),
            "domcontentloaded" => Some(LoadState::DomContentLoaded),
            "networkidle" => Some(LoadState::NetworkIdle),
            _ => None,
        }
    }
}

/// When to consider navigation succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// Consider operation to be finished when the `load` event is fired
    #[default]
    Load,
    /// Consider operation to be finished when the `DOMContentLoaded` event is fired
    DomContentLoaded,
    /// Consider operation to be finished when there are no network connections for at least 500ms
    NetworkIdle,
    /// Consider operation to be finished when the navigation commits
    Commit,
}

impl WaitUntil {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
            WaitUntil::Commit => "commit",
        }
    }

    /// The milestone that must fire after commit, `None` for [`WaitUntil::Commit`].
    pub fn milestone(&self) -> Option<LoadState> {
        match self {
            WaitUntil::Load => Some(LoadState::Load),
            WaitUntil::DomContentLoaded => Some(LoadState::DomContentLoaded),
            WaitUntil::NetworkIdle => Some(LoadState::NetworkIdle),
            WaitUntil::Commit => None,
        }
    }
}

/// Decides which committed URLs a navigation waiter accepts
#[derive(Clone)]
pub enum UrlMatcher {
    /// Glob pattern such as `**/checkout/*`
    Glob(glob::Pattern),
    Regex(Regex),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl UrlMatcher {
    /// Compiles a glob pattern.
    pub fn glob(pattern: &str) -> Result<Self> {
        glob::Pattern::new(pattern)
            .map(UrlMatcher::Glob)
            .map_err(|e| Error::InvalidArgument(format!("Invalid URL glob \"{pattern}\": {e}")))
    }

    /// Compiles a regular expression.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(UrlMatcher::Regex)
            .map_err(|e| Error::InvalidArgument(format!("Invalid URL regex \"{pattern}\": {e}")))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        UrlMatcher::Predicate(Arc::new(f))
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlMatcher::Glob(pattern) => pattern.matches(url),
            UrlMatcher::Regex(re) => re.is_match(url),
            UrlMatcher::Predicate(f) => f(url),
        }
    }
}

impl fmt::Debug for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlMatcher::Glob(pattern) => f.debug_tuple("Glob").field(&pattern.as_str()).finish(),
            UrlMatcher::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            UrlMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Options for frame.goto() and page.goto()
///
/// See: <https://playwright.dev/docs/api/class-page#page-goto>
#[derive(Debug, Clone, Default)]
pub struct GotoOptions {
    /// Maximum navigation time; zero disables the deadline
    pub timeout: Option<Duration>,
    /// When to consider operation succeeded
    pub wait_until: Option<WaitUntil>,
    /// Referer header value
    pub referer: Option<String>,
}

impl GotoOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.wait_until = Some(wait_until);
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// Options for frame.wait_for_navigation()
///
/// See: <https://playwright.dev/docs/api/class-frame#frame-wait-for-navigation>
#[derive(Debug, Clone, Default)]
pub struct WaitForNavigationOptions {
    pub timeout: Option<Duration>,
    pub wait_until: Option<WaitUntil>,
    /// Only navigations committing a matching URL count
    pub url: Option<UrlMatcher>,
}

impl WaitForNavigationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.wait_until = Some(wait_until);
        self
    }

    pub fn url(mut self, matcher: UrlMatcher) -> Self {
        self.url = Some(matcher);
        self
    }
}
