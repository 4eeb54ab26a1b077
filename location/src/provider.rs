//! The seam between the session manager and a positioning engine.

use std::fmt;
use std::sync::Arc;

use geobridge_privacy::ComplianceApi;

use crate::{ProviderFault, RawFix, SessionConfig};

/// Callback a [`NativeHandle`] invokes for every determination.
///
/// `None` means the engine completed without a usable record. Listeners may
/// be invoked on any thread, including synchronously from within
/// [`NativeHandle::start`].
pub type FixListener = Arc<dyn Fn(Option<RawFix>) + Send + Sync>;

/// A positioning engine able to build location clients.
pub trait FixProvider: ComplianceApi + fmt::Debug {
    /// Builds a client configured for one session.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderFault`] if the engine refuses to build a client,
    /// typically because privacy compliance was not declared.
    fn create_handle(&self, config: &SessionConfig) -> Result<Arc<dyn NativeHandle>, ProviderFault>;
}

/// One live client of the positioning engine.
///
/// Handles are owned by the session manager. `stop` and `destroy` may be
/// called again on a handle whose earlier `stop` never returned, so both
/// must tolerate repeated calls.
pub trait NativeHandle: Send + Sync + fmt::Debug {
    /// Registers `listener` and starts determinations.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderFault`] if the engine fails to start.
    fn start(&self, listener: FixListener) -> Result<(), ProviderFault>;

    /// Stops determinations.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderFault`] if the engine fails to stop.
    fn stop(&self) -> Result<(), ProviderFault>;

    /// Releases the client. The listener must not be invoked afterwards.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderFault`] if the engine fails to release resources.
    fn destroy(&self) -> Result<(), ProviderFault>;
}
