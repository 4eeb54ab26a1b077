//! Privacy compliance gating for location sessions.
//!
//! Vendor positioning SDKs refuse to build location clients until the host
//! app has declared that it showed a privacy disclosure and that the user
//! agreed to it. [`PrivacyGate`] records both declarations and answers the
//! single question every session start asks: may we proceed?

#![warn(missing_docs)]

use std::sync::{Mutex, MutexGuard};

use log::{error, info};

/// Snapshot of the two privacy declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrivacyState {
    /// A privacy disclosure containing the provider's terms was shown.
    pub shown: bool,
    /// The user agreed to the disclosure.
    pub agreed: bool,
}

impl PrivacyState {
    /// Both declarations have been made.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.shown && self.agreed
    }
}

/// A failure reported by the provider's compliance API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ComplianceFault {
    /// Provider supplied description.
    pub message: String,
}

impl ComplianceFault {
    /// Creates a fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the privacy operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrivacyError {
    /// The provider rejected a privacy update.
    #[error("{operation} failed: {fault}")]
    UpdateFailed {
        /// Name of the bridge operation that failed.
        operation: &'static str,
        /// Underlying provider fault.
        fault: ComplianceFault,
    },
}

/// The provider side of privacy compliance.
///
/// Implementations forward the declarations to the vendor SDK. Both calls
/// must happen before the SDK will construct any location client.
pub trait ComplianceApi: Send + Sync {
    /// Declares whether the privacy disclosure was shown.
    ///
    /// # Errors
    ///
    /// Returns a [`ComplianceFault`] when the SDK rejects the call.
    fn update_privacy_show(&self, contains: bool, show: bool) -> Result<(), ComplianceFault>;

    /// Declares whether the user agreed to the disclosure.
    ///
    /// # Errors
    ///
    /// Returns a [`ComplianceFault`] when the SDK rejects the call.
    fn update_privacy_agree(&self, agree: bool) -> Result<(), ComplianceFault>;
}

/// Tracks the privacy declarations and gates session starts.
///
/// Flags only ever latch to `true`. A gate is reset by constructing a new
/// one, which is what reloading the plugin does.
#[derive(Debug, Default)]
pub struct PrivacyGate {
    state: Mutex<PrivacyState>,
}

impl PrivacyGate {
    /// Creates a gate with nothing declared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort declaration of both flags, performed once at plugin load.
    ///
    /// Failures are logged and leave the gate closed; the consumer can still
    /// satisfy it later through [`update_disclosure`](Self::update_disclosure)
    /// and [`update_consent`](Self::update_consent).
    pub fn initialize<A: ComplianceApi + ?Sized>(&self, api: &A) -> bool {
        let result = self
            .update_disclosure(api, true, true)
            .and_then(|()| self.update_consent(api, true));

        match result {
            Ok(()) => {
                info!("privacy compliance declared at load");
                true
            }
            Err(err) => {
                error!("privacy compliance failed at load: {err}");
                false
            }
        }
    }

    /// Forwards a disclosure declaration to the provider and records it.
    ///
    /// # Errors
    ///
    /// Returns [`PrivacyError::UpdateFailed`] if the provider rejects the call;
    /// the recorded state is unchanged in that case.
    pub fn update_disclosure<A: ComplianceApi + ?Sized>(
        &self,
        api: &A,
        contains: bool,
        show: bool,
    ) -> Result<(), PrivacyError> {
        api.update_privacy_show(contains, show)
            .map_err(|fault| update_failed("updatePrivacyShow", fault))?;

        let mut state = self.lock_state();
        state.shown |= contains && show;
        info!("updatePrivacyShow: contains={contains} show={show} shown={}", state.shown);
        Ok(())
    }

    /// Forwards a consent declaration to the provider and records it.
    ///
    /// # Errors
    ///
    /// Returns [`PrivacyError::UpdateFailed`] if the provider rejects the call;
    /// the recorded state is unchanged in that case.
    pub fn update_consent<A: ComplianceApi + ?Sized>(
        &self,
        api: &A,
        agree: bool,
    ) -> Result<(), PrivacyError> {
        api.update_privacy_agree(agree)
            .map_err(|fault| update_failed("updatePrivacyAgree", fault))?;

        let mut state = self.lock_state();
        state.agreed |= agree;
        info!("updatePrivacyAgree: agree={agree} agreed={}", state.agreed);
        Ok(())
    }

    /// Whether both declarations have been made since the gate was created.
    #[must_use]
    pub fn is_compliant(&self) -> bool {
        self.lock_state().is_complete()
    }

    /// Current declarations.
    #[must_use]
    pub fn state(&self) -> PrivacyState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, PrivacyState> {
        self.state.lock().expect("privacy state mutex poisoned")
    }
}

fn update_failed(operation: &'static str, fault: ComplianceFault) -> PrivacyError {
    error!("{operation} failed: {fault}");
    PrivacyError::UpdateFailed { operation, fault }
}
