//! Location session lifecycle management.
//!
//! This crate owns the state machine between a web bridge and a vendor
//! positioning engine: it gates every session on privacy compliance, keeps at
//! most one one-shot request and one continuous watch alive at a time, routes
//! provider callbacks to the right consumer, and tears everything down on
//! request even when the engine stops responding.
//!
//! The engine is reached through [`FixProvider`] and [`NativeHandle`]. Fixes
//! are passed through in the engine's native GCJ-02 frame.
//!
//! # Usage
//!
//! ```ignore
//! use geobridge_location::{OnceOptions, SessionManager, WatchMode, WatchOptions};
//!
//! let (manager, events) = SessionManager::new(provider);
//! manager.initialize_privacy();
//!
//! let fix = manager.get_current_position(OnceOptions::default()).await?;
//! println!("lat={} lng={}", fix.lat, fix.lng);
//!
//! let watch_id = manager.start_watch(WatchOptions::new(WatchMode::Running))?;
//! while let Ok(event) = events.recv().await {
//!     println!("{}: {event:?}", event.name());
//! }
//! ```

#![warn(missing_docs)]

mod config;
mod dispatch;
mod error;
/// Events delivered to bridge listeners.
pub mod event;
mod fix;
mod manager;
mod provider;
mod session;
mod teardown;

#[cfg(test)]
mod tests;

pub use config::{
    AccuracyProfile, DEFAULT_CACHE_MAX_AGE_MS, DEFAULT_ONCE_TIMEOUT_MS, DEFAULT_WATCH_TIMEOUT_MS,
    OnceMode, OnceOptions, SessionConfig, SessionKind, SessionMode, WatchMode, WatchOptions,
};
pub use error::{LocationError, LocationResult, ProviderFault};
pub use event::{ErrorEvent, EventCode, EventSink, EventStream, LocationEvent};
pub use fix::{CoordSystem, Fix, FixFailure, RawFix};
pub use geobridge_privacy::{ComplianceApi, ComplianceFault, PrivacyError, PrivacyState};
pub use manager::SessionManager;
pub use provider::{FixListener, FixProvider, NativeHandle};
pub use session::{SessionId, SessionSnapshot, SessionStatus, WatchId};
pub use teardown::{TeardownFault, TeardownReport, TeardownStage};
