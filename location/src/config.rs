use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{LocationError, LocationResult};

/// Default provider timeout for a one-shot request.
pub const DEFAULT_ONCE_TIMEOUT_MS: u64 = 8000;
/// Default age of a cached fix a fast one-shot request may accept.
pub const DEFAULT_CACHE_MAX_AGE_MS: u64 = 5000;
/// Provider network timeout used by continuous sessions.
pub const DEFAULT_WATCH_TIMEOUT_MS: u64 = 30_000;

/// The two kinds of session the manager owns, at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Produces one fix or error, then self-terminates.
    Once,
    /// Produces a stream of fixes and errors until stopped.
    Watch,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once => f.write_str("once"),
            Self::Watch => f.write_str("watch"),
        }
    }
}

/// Mode of a one-shot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnceMode {
    /// High accuracy, accepts a recent cached fix for a quick cold start.
    #[default]
    Fast,
    /// High accuracy, always forces a fresh determination.
    Precise,
}

/// Mode of a continuous session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Low power updates for map browsing.
    #[default]
    Browse,
    /// High frequency updates for activity tracking.
    Running,
}

impl WatchMode {
    /// Update interval used when the consumer does not provide one.
    #[must_use]
    pub const fn default_interval_ms(self) -> u64 {
        match self {
            Self::Browse => 5000,
            Self::Running => 1000,
        }
    }

    /// Distance filter used when the consumer does not provide one.
    #[must_use]
    pub const fn default_distance_filter_m(self) -> u32 {
        match self {
            Self::Browse => 10,
            Self::Running => 3,
        }
    }

    /// Accuracy profile the provider is asked to use.
    #[must_use]
    pub const fn accuracy(self) -> AccuracyProfile {
        match self {
            Self::Browse => AccuracyProfile::BatterySaving,
            Self::Running => AccuracyProfile::DeviceSensors,
        }
    }
}

/// Provider positioning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccuracyProfile {
    /// Best available source, network and satellites combined.
    HighAccuracy,
    /// Satellite and device sensors only.
    DeviceSensors,
    /// Network positioning blended with sensors at low power.
    BatterySaving,
}

/// Mode of a session, carrying its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "mode", rename_all = "lowercase")]
pub enum SessionMode {
    /// A one-shot request.
    Once(OnceMode),
    /// A continuous session.
    Watch(WatchMode),
}

/// Consumer options for a one-shot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnceOptions {
    /// Request mode.
    pub mode: OnceMode,
    /// Provider timeout in milliseconds, must be positive.
    pub timeout_ms: u64,
    /// Maximum age of an acceptable cached fix; zero disables the cache.
    pub cache_max_age_ms: u64,
}

impl Default for OnceOptions {
    fn default() -> Self {
        Self {
            mode: OnceMode::Fast,
            timeout_ms: DEFAULT_ONCE_TIMEOUT_MS,
            cache_max_age_ms: DEFAULT_CACHE_MAX_AGE_MS,
        }
    }
}

/// Consumer options for a continuous session.
///
/// Unset fields fall back to the defaults of the chosen [`WatchMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchOptions {
    /// Session mode.
    pub mode: WatchMode,
    /// Update interval in milliseconds.
    pub interval_ms: Option<u64>,
    /// Minimum movement between updates in meters.
    pub distance_filter_m: Option<u32>,
}

impl WatchOptions {
    /// Options for `mode` with its default interval and distance filter.
    #[must_use]
    pub const fn new(mode: WatchMode) -> Self {
        Self {
            mode,
            interval_ms: None,
            distance_filter_m: None,
        }
    }
}

/// Provider configuration of one session. Fixed once the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Kind and consumer facing mode.
    pub mode: SessionMode,
    /// Positioning strategy.
    pub accuracy: AccuracyProfile,
    /// Update interval; zero for one-shot requests.
    pub interval_ms: u64,
    /// Minimum movement between updates; zero for one-shot requests.
    pub distance_filter_m: u32,
    /// Provider network timeout.
    pub timeout_ms: u64,
    /// Maximum age of an acceptable cached fix.
    pub cache_max_age_ms: u64,
    /// Whether the provider may answer from its fix cache.
    pub cache_enabled: bool,
    /// Stop after the first fix.
    pub once_location: bool,
    /// Wait for the most accurate fix within the timeout before answering.
    pub once_location_latest: bool,
    /// Whether to reverse geocode fixes.
    pub need_address: bool,
}

impl SessionConfig {
    /// Configuration of a one-shot request.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidOptions`] when the timeout is zero.
    pub fn once(options: &OnceOptions) -> LocationResult<Self> {
        if options.timeout_ms == 0 {
            return Err(LocationError::InvalidOptions(
                "timeout must be greater than 0".into(),
            ));
        }

        Ok(Self {
            mode: SessionMode::Once(options.mode),
            accuracy: AccuracyProfile::HighAccuracy,
            interval_ms: 0,
            distance_filter_m: 0,
            timeout_ms: options.timeout_ms,
            cache_max_age_ms: options.cache_max_age_ms,
            cache_enabled: options.mode == OnceMode::Fast && options.cache_max_age_ms > 0,
            once_location: true,
            once_location_latest: true,
            need_address: false,
        })
    }

    /// Configuration of a continuous session.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidOptions`] when the interval is zero.
    pub fn watch(options: &WatchOptions) -> LocationResult<Self> {
        let interval_ms = options
            .interval_ms
            .unwrap_or_else(|| options.mode.default_interval_ms());
        if interval_ms == 0 {
            return Err(LocationError::InvalidOptions(
                "interval must be greater than 0".into(),
            ));
        }

        Ok(Self {
            mode: SessionMode::Watch(options.mode),
            accuracy: options.mode.accuracy(),
            interval_ms,
            distance_filter_m: options
                .distance_filter_m
                .unwrap_or_else(|| options.mode.default_distance_filter_m()),
            timeout_ms: DEFAULT_WATCH_TIMEOUT_MS,
            cache_max_age_ms: interval_ms,
            cache_enabled: true,
            once_location: false,
            once_location_latest: false,
            need_address: false,
        })
    }

    /// Kind of session this configuration describes.
    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        match self.mode {
            SessionMode::Once(_) => SessionKind::Once,
            SessionMode::Watch(_) => SessionKind::Watch,
        }
    }
}
