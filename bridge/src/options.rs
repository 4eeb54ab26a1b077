//! Call options as they arrive from the web layer.
//!
//! Every field is optional on the wire; missing fields take the defaults
//! below.

use geobridge_location::{
    DEFAULT_CACHE_MAX_AGE_MS, DEFAULT_ONCE_TIMEOUT_MS, OnceMode, OnceOptions, WatchId, WatchMode,
    WatchOptions,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::BridgeRejection;

/// Options of `updatePrivacyShow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacyShowOptions {
    /// Whether the disclosure contains the location clause.
    pub is_contains: bool,
    /// Whether the disclosure was shown.
    pub is_show: bool,
}

impl Default for PrivacyShowOptions {
    fn default() -> Self {
        Self {
            is_contains: true,
            is_show: true,
        }
    }
}

/// Options of `updatePrivacyAgree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacyAgreeOptions {
    /// Whether the user agreed.
    pub is_agree: bool,
}

impl Default for PrivacyAgreeOptions {
    fn default() -> Self {
        Self { is_agree: true }
    }
}

/// Options of `getCurrentPosition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetCurrentPositionOptions {
    /// `fast` or `precise`.
    pub mode: OnceMode,
    /// Provider timeout in milliseconds.
    pub timeout: u64,
    /// Maximum age of an acceptable cached fix in milliseconds.
    pub cache_max_age: u64,
}

impl Default for GetCurrentPositionOptions {
    fn default() -> Self {
        Self {
            mode: OnceMode::Fast,
            timeout: DEFAULT_ONCE_TIMEOUT_MS,
            cache_max_age: DEFAULT_CACHE_MAX_AGE_MS,
        }
    }
}

impl From<GetCurrentPositionOptions> for OnceOptions {
    fn from(options: GetCurrentPositionOptions) -> Self {
        Self {
            mode: options.mode,
            timeout_ms: options.timeout,
            cache_max_age_ms: options.cache_max_age,
        }
    }
}

/// Options of `startWatch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartWatchOptions {
    /// `browse` or `running`.
    pub mode: WatchMode,
    /// Update interval in milliseconds; defaults per mode.
    pub interval: Option<u64>,
    /// Minimum movement in meters; defaults per mode.
    pub distance_filter: Option<u32>,
}

impl From<StartWatchOptions> for WatchOptions {
    fn from(options: StartWatchOptions) -> Self {
        Self {
            mode: options.mode,
            interval_ms: options.interval,
            distance_filter_m: options.distance_filter,
        }
    }
}

/// Result of `startWatch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWatchResult {
    /// Identifier of the new watch session.
    pub watch_id: WatchId,
}

/// Decodes call arguments, treating `null` as "all defaults".
pub(crate) fn decode<T>(method: &str, args: Value) -> Result<T, BridgeRejection>
where
    T: DeserializeOwned + Default,
{
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args).map_err(|err| BridgeRejection::invalid_options(method, &err))
}
