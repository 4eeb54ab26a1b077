use geobridge_privacy::PrivacyError;

/// Convenient result alias for location operations.
pub type LocationResult<T> = Result<T, LocationError>;

/// A failure reported by a [`FixProvider`](crate::FixProvider) or one of its handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderFault {
    /// Provider supplied description.
    pub message: String,
}

impl ProviderFault {
    /// Creates a fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced to callers of the session manager.
///
/// Every provider-layer failure is converted into one of these at the
/// boundary; nothing else crosses it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    /// `updatePrivacyShow` and `updatePrivacyAgree` have not both succeeded.
    #[error("privacy compliance not completed; call updatePrivacyShow and updatePrivacyAgree first")]
    PrivacyNotCompliant,
    /// A privacy update was rejected by the provider.
    #[error(transparent)]
    PrivacyUpdateFailed(#[from] PrivacyError),
    /// The provider completed a one-shot request without a fix.
    #[error("location is null")]
    NullFix,
    /// The provider reported a failed determination.
    #[error("location error {code}: {message}")]
    Provider {
        /// Provider error code.
        code: i32,
        /// Provider error description.
        message: String,
    },
    /// The one-shot client could not be created or started.
    #[error("getCurrentPosition failed: {0}")]
    OnceStartFailed(ProviderFault),
    /// The continuous client could not be created or started.
    #[error("startWatch failed: {0}")]
    WatchStartFailed(ProviderFault),
    /// Consumer supplied options were rejected.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// A newer `getCurrentPosition` call replaced this one.
    #[error("superseded by a newer getCurrentPosition call")]
    Superseded,
    /// All sessions were torn down by `forceDestroy`.
    #[error("all location clients forcibly destroyed")]
    ForceDestroyed,
    /// The plugin was unloaded while the call was pending.
    #[error("location plugin unloaded")]
    PluginUnloaded,
}

impl LocationError {
    /// Stable code reported to bridge consumers when a call is rejected.
    ///
    /// Provider failures use the provider's numeric code.
    #[must_use]
    pub fn code(&self) -> String {
        let code = match self {
            Self::PrivacyNotCompliant => "PRIVACY_NOT_COMPLIANT",
            Self::PrivacyUpdateFailed(_) => "PRIVACY_UPDATE_FAILED",
            Self::NullFix => "NULL_FIX",
            Self::Provider { code, .. } => return code.to_string(),
            Self::OnceStartFailed(_) => "ONCE_START_FAILED",
            Self::WatchStartFailed(_) => "WATCH_START_FAILED",
            Self::InvalidOptions(_) => "INVALID_OPTIONS",
            Self::Superseded => "SUPERSEDED",
            Self::ForceDestroyed => crate::event::FORCE_DESTROY,
            Self::PluginUnloaded => "PLUGIN_UNLOADED",
        };
        code.to_owned()
    }
}
