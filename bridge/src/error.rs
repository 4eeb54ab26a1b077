use geobridge_location::LocationError;
use serde::Serialize;

/// A rejected bridge call, as handed back to the web layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BridgeRejection {
    /// Stable rejection code, or the provider's numeric code as a string.
    pub code: String,
    /// Human readable description.
    pub message: String,
}

impl BridgeRejection {
    /// Rejection for a method name the plugin does not implement.
    #[must_use]
    pub fn unimplemented(method: &str) -> Self {
        Self {
            code: "UNIMPLEMENTED".into(),
            message: format!("method `{method}` is not implemented"),
        }
    }

    pub(crate) fn invalid_options(method: &str, err: &serde_json::Error) -> Self {
        Self::from(LocationError::InvalidOptions(format!("{method}: {err}")))
    }
}

impl From<LocationError> for BridgeRejection {
    fn from(err: LocationError) -> Self {
        let code = err.code();
        let message = match err {
            LocationError::Provider { message, .. } => message,
            other => other.to_string(),
        };
        Self { code, message }
    }
}
