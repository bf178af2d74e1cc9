// Per-page timeout configuration
//
// A Page owns one TimeoutSettings and shares it with its frames, so setting
// a default on the page applies to every navigation in it.

use parking_lot::Mutex;
use std::time::Duration;

/// Default timeouts for a page and its frames.
///
/// Resolution order: explicit option, default navigation timeout, default
/// timeout, then [`DEFAULT_TIMEOUT_MS`](crate::DEFAULT_TIMEOUT_MS). A zero
/// duration at any level disables the deadline.
#[derive(Debug, Default)]
pub struct TimeoutSettings {
    inner: Mutex<Defaults>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Defaults {
    timeout: Option<Duration>,
    navigation_timeout: Option<Duration>,
}

impl TimeoutSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// See: <https://playwright.dev/docs/api/class-page#page-set-default-timeout>
    pub fn set_default_timeout(&self, timeout: Duration) {
        self.inner.lock().timeout = Some(timeout);
    }

    /// See: <https://playwright.dev/docs/api/class-page#page-set-default-navigation-timeout>
    pub fn set_default_navigation_timeout(&self, timeout: Duration) {
        self.inner.lock().navigation_timeout = Some(timeout);
    }

    /// Deadline for a non-navigation wait, `None` when disabled.
    pub fn timeout(&self, option: Option<Duration>) -> Option<Duration> {
        let defaults = *self.inner.lock();
        enabled(option.or(defaults.timeout).unwrap_or_else(default_duration))
    }

    /// Deadline for a navigation, `None` when disabled.
    pub fn navigation_timeout(&self, option: Option<Duration>) -> Option<Duration> {
        let defaults = *self.inner.lock();
        enabled(
            option
                .or(defaults.navigation_timeout)
                .or(defaults.timeout)
                .unwrap_or_else(default_duration),
        )
    }
}

fn default_duration() -> Duration {
    Duration::from_millis(crate::DEFAULT_TIMEOUT_MS as u64)
}

fn enabled(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_timeout_precedence() {
        let settings = TimeoutSettings::new();
        assert_eq!(
            settings.navigation_timeout(None),
            Some(Duration::from_millis(30_000))
        );

        settings.set_default_timeout(Duration::from_secs(5));
        assert_eq!(settings.navigation_timeout(None), Some(Duration::from_secs(5)));
        assert_eq!(settings.timeout(None), Some(Duration::from_secs(5)));

        settings.set_default_navigation_timeout(Duration::from_secs(2));
        assert_eq!(settings.navigation_timeout(None), Some(Duration::from_secs(2)));
        assert_eq!(settings.timeout(None), Some(Duration::from_secs(5)));

        assert_eq!(
            settings.navigation_timeout(Some(Duration::from_millis(10))),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_zero_disables_deadline() {
        let settings = TimeoutSettings::new();
        settings.set_default_navigation_timeout(Duration::ZERO);
        assert_eq!(settings.navigation_timeout(None), None);
        assert_eq!(
            settings.navigation_timeout(Some(Duration::from_secs(1))),
            Some(Duration::from_secs(1))
        );
        assert_eq!(settings.timeout(Some(Duration::ZERO)), None);
    }
}
