//! # geobridge
//!
//! Privacy-gated location sessions for web view bridges.
//!
//! geobridge manages the lifecycle of location sessions on top of a vendor
//! positioning engine: a single fix ("get current position") or a continuous
//! stream ("watch position"), never more than one of each, never before the
//! user has seen and agreed to the privacy disclosure.
//!
//! ## Features
//!
//! - `privacy`: the disclosure and consent gate.
//! - `location`: the session manager, its events and forced teardown.
//! - `bridge` (default): `LocationPlugin`, the JSON surface a web view talks to.
//! - `sim`: a scriptable in-process engine for tests and demos.
//!
//! Use the `full` feature to enable everything.
//!
//! ## Example
//!
//! ```toml
//! [dependencies]
//! geobridge = { version = "0.1", features = ["full"] }
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use geobridge::bridge::LocationPlugin;
//! use geobridge::sim::{SimProvider, sim_fix};
//!
//! async fn locate() {
//!     let engine = Arc::new(SimProvider::new());
//!     engine.queue_once(Some(sim_fix(31.23, 121.47, 15.0)));
//!
//!     let plugin = LocationPlugin::new(engine).unwrap();
//!     let fix = plugin.invoke("getCurrentPosition", serde_json::Value::Null).await;
//!     println!("{fix:?}");
//! }
//! ```

#[cfg(feature = "bridge")]
pub use geobridge_bridge as bridge;

#[cfg(feature = "location")]
pub use geobridge_location as location;

#[cfg(feature = "privacy")]
pub use geobridge_privacy as privacy;

#[cfg(feature = "sim")]
pub use geobridge_provider_sim as sim;
