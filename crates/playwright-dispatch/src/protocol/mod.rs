// Protocol Objects - Rust proxies for remote Playwright objects
//
// Architecture:
// - All protocol objects implement the ChannelOwner trait
// - Objects are created by the object factory when the driver sends __create__
// - Objects communicate with the driver via their Channel
// - Values crossing the wire in evaluate calls use the envelope codec

pub mod evaluate_conversion;
pub mod frame;
pub mod js_handle;
pub mod js_value;
pub mod lifecycle_watcher;
pub mod navigation;
pub mod page;
pub mod remote_object;
pub mod request;
pub mod response;
pub mod root;
pub mod timeout_settings;

pub use evaluate_conversion::{
    SerializedArgument, parse_result, parse_value, serialize_argument, serialize_null,
    serialize_serde_argument,
};
pub use frame::{Frame, FrameEvent};
pub use js_handle::JsHandle;
pub use js_value::{JsValue, from_js_value, to_js_value};
pub use lifecycle_watcher::{CancelReason, LifecycleWatcher, NavigationOutcome};
pub use navigation::{GotoOptions, LoadState, UrlMatcher, WaitForNavigationOptions, WaitUntil};
pub use page::Page;
pub use remote_object::RemoteObject;
pub use request::Request;
pub use response::ResponseObject;
pub use root::Root;
pub use timeout_settings::TimeoutSettings;
