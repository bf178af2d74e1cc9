//! playwright-dispatch: client-side protocol engine for the Playwright driver
//!
//! This crate speaks the Playwright driver protocol: it frames JSON messages
//! over a pipe or WebSocket, correlates calls with responses, keeps the tree
//! of remote objects in sync with `__create__` / `__dispose__` / `__adopt__`,
//! marshals evaluate arguments and results, and decides when a navigation is
//! finished.
//!
//! # Examples
//!
//! ## Connecting over the driver's stdio
//!
//! ```ignore
//! use playwright_dispatch::Connection;
//! use tokio::process::Command;
//! use std::process::Stdio;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut driver = Command::new("node")
//!         .args(["cli.js", "run-driver"])
//!         .stdin(Stdio::piped())
//!         .stdout(Stdio::piped())
//!         .spawn()?;
//!     let stdin = driver.stdin.take().ok_or("no stdin")?;
//!     let stdout = driver.stdout.take().ok_or("no stdout")?;
//!
//!     let connection = Connection::over_pipe(stdin, stdout);
//!     connection.spawn_run();
//!     let playwright = connection.initialize().await?;
//!     println!("connected: {}", playwright.guid());
//!     Ok(())
//! }
//! ```
//!
//! ## Navigating and evaluating
//!
//! ```ignore
//! use playwright_dispatch::{GotoOptions, JsValue, Page, WaitUntil};
//! use std::time::Duration;
//!
//! async fn run(page: Page) -> playwright_dispatch::Result<()> {
//!     page.set_default_navigation_timeout(Duration::from_secs(10));
//!
//!     let response = page
//!         .goto(
//!             "https://example.com",
//!             Some(GotoOptions::new().wait_until(WaitUntil::DomContentLoaded)),
//!         )
//!         .await?;
//!     if let Some(response) = response {
//!         assert!(response.ok());
//!     }
//!
//!     let sum: f64 = page
//!         .evaluate("([a, b]) => a + b", Some(&JsValue::from(vec![1, 2])))
//!         .await?;
//!     assert_eq!(sum, 3.0);
//!     Ok(())
//! }
//! ```

// Internal modules (exposed for integration tests)
#[doc(hidden)]
pub mod server;

pub mod api;
mod error;
pub mod protocol;

/// Default timeout in milliseconds for driver calls and navigations.
///
/// This matches Playwright's standard default across all language implementations (Python, Java, .NET, JS).
///
/// See: <https://playwright.dev/docs/test-timeouts>
pub const DEFAULT_TIMEOUT_MS: f64 = 30000.0;

// Re-export error types
pub use error::{Error, Result};

// Re-export the connection entry point
pub use server::connection::Connection;
pub use server::transport::TransportEvent;

// Re-export protocol objects
pub use protocol::{Frame, JsHandle, Page, RemoteObject, Request, ResponseObject};

// Re-export the value codec
pub use protocol::{JsValue, from_js_value, to_js_value};

// Re-export navigation types
pub use protocol::{
    CancelReason, FrameEvent, GotoOptions, LifecycleWatcher, LoadState, NavigationOutcome,
    TimeoutSettings, UrlMatcher, WaitForNavigationOptions, WaitUntil,
};

// Re-export connect options
pub use api::ConnectOptions;
