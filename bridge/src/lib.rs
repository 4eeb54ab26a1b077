//! Bridge surface of the geobridge location plugin.
//!
//! [`LocationPlugin`] is what a web view host talks to. It owns a
//! [`SessionManager`](geobridge_location::SessionManager), accepts the six
//! location operations with camelCase JSON options, and fans
//! `locationUpdate`/`locationError` events out to registered listeners.
//!
//! ```ignore
//! use geobridge_bridge::{EventName, LocationPlugin};
//! use serde_json::json;
//!
//! let plugin = LocationPlugin::new(provider)?;
//! plugin.add_listener(EventName::LocationUpdate, |fix| println!("{fix}"));
//!
//! let fix = plugin.invoke("getCurrentPosition", json!({ "mode": "fast" })).await?;
//! plugin.invoke("startWatch", json!({ "mode": "running" })).await?;
//!
//! // Later, from a navigation handler:
//! plugin.safe_stop_watch();
//! ```

#![warn(missing_docs)]

mod error;
mod listeners;
mod options;
mod plugin;
mod shutdown;

pub use error::BridgeRejection;
pub use listeners::{EventName, ListenerHandle, UnknownEvent};
pub use options::{
    GetCurrentPositionOptions, PrivacyAgreeOptions, PrivacyShowOptions, StartWatchOptions,
    StartWatchResult,
};
pub use plugin::{DEFAULT_STOP_TIMEOUT, LocationPlugin, LocationPluginBuilder, StopOutcome};
