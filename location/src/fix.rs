use serde::{Deserialize, Serialize};

use crate::LocationError;

/// Coordinate reference frame of a [`Fix`].
///
/// The provider reports GCJ-02 natively and fixes are passed through
/// untouched, so this is the only frame there is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CoordSystem {
    /// GCJ-02, the provider's native frame.
    #[default]
    #[serde(rename = "gcj02")]
    Gcj02,
}

/// A normalized location fix as delivered to bridge consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
    /// Bearing in degrees, `-1` or `0` when unknown depending on the provider.
    pub bearing: f64,
    /// Speed in meters per second.
    pub speed: f64,
    /// Fix time as Unix epoch milliseconds.
    pub timestamp: i64,
    /// Always [`CoordSystem::Gcj02`].
    pub coord_system: CoordSystem,
    /// Provider specific source of the fix (GPS, cache, wifi, cell...).
    pub location_type: i32,
    /// Reverse geocoded address, when the provider resolved one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Name of the positioning source, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// A fix record as handed over by the provider, error fields included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFix {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
    /// Bearing in degrees.
    pub bearing: f64,
    /// Speed in meters per second.
    pub speed: f64,
    /// Fix time as Unix epoch milliseconds.
    pub time: i64,
    /// Provider specific source of the fix.
    pub location_type: i32,
    /// Reverse geocoded address.
    pub address: Option<String>,
    /// Name of the positioning source.
    pub provider: Option<String>,
    /// Zero on success, provider error code otherwise.
    pub error_code: i32,
    /// Provider error description.
    pub error_info: String,
}

/// A determination the provider reported as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixFailure {
    /// Provider error code, never zero.
    pub code: i32,
    /// Provider error description.
    pub message: String,
}

impl From<FixFailure> for LocationError {
    fn from(failure: FixFailure) -> Self {
        Self::Provider {
            code: failure.code,
            message: failure.message,
        }
    }
}

impl RawFix {
    /// Splits the record into a usable fix or the provider failure it carries.
    ///
    /// # Errors
    ///
    /// Returns a [`FixFailure`] when `error_code` is nonzero.
    pub fn into_fix(self) -> Result<Fix, FixFailure> {
        if self.error_code != 0 {
            return Err(FixFailure {
                code: self.error_code,
                message: self.error_info,
            });
        }

        Ok(Fix {
            lat: self.lat,
            lng: self.lng,
            accuracy: self.accuracy,
            bearing: self.bearing,
            speed: self.speed,
            timestamp: self.time,
            coord_system: CoordSystem::Gcj02,
            location_type: self.location_type,
            address: self.address.filter(|s| !s.is_empty()),
            provider: self.provider.filter(|s| !s.is_empty()),
        })
    }
}
