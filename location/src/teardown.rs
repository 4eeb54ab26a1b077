//! Forced teardown and plugin unload.
//!
//! These paths never take the per-kind start gates, so a start or stop call
//! stuck inside the provider cannot keep them from running.

use std::fmt;

use log::{info, warn};

use crate::{LocationError, ProviderFault, SessionId, SessionKind, SessionManager};

/// Step of releasing a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStage {
    /// `NativeHandle::stop`.
    Stop,
    /// `NativeHandle::destroy`.
    Destroy,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => f.write_str("stop"),
            Self::Destroy => f.write_str("destroy"),
        }
    }
}

/// A provider fault suppressed during teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFault {
    /// Kind of the session being released.
    pub kind: SessionKind,
    /// Session being released.
    pub session: SessionId,
    /// Step that failed.
    pub stage: TeardownStage,
    /// What the provider reported.
    pub fault: ProviderFault,
}

/// Outcome of a best-effort cleanup.
///
/// Cleanup never fails from the caller's point of view; this lists what was
/// released and which provider faults were logged and swallowed on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Sessions this call moved to `Destroyed`.
    pub released: Vec<(SessionKind, SessionId)>,
    /// Suppressed provider faults.
    pub faults: Vec<TeardownFault>,
    /// For `force_destroy`, the position of the `FORCE_DESTROY_CONFIRMED`
    /// event it emitted among all confirmations on the manager's stream,
    /// starting at 1. `None` for paths that emit no events.
    pub confirmation: Option<u64>,
}

impl TeardownReport {
    /// Whether no provider fault was suppressed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    pub(crate) fn record(
        &mut self,
        kind: SessionKind,
        session: SessionId,
        stage: TeardownStage,
        fault: ProviderFault,
    ) {
        self.faults.push(TeardownFault {
            kind,
            session,
            stage,
            fault,
        });
    }
}

impl SessionManager {
    /// Unconditionally destroys both sessions, then notifies listeners.
    ///
    /// Meant for a consumer whose graceful `stopWatch` did not complete in
    /// time. Both handles are stopped and destroyed whatever their recorded
    /// status, each independently of the other. A pending one-shot call is
    /// rejected with [`LocationError::ForceDestroyed`]. Two `locationError`
    /// events follow, `FORCE_DESTROY` then `FORCE_DESTROY_CONFIRMED`; no
    /// event from a destroyed session is emitted after the confirmation.
    pub fn force_destroy(&self) -> TeardownReport {
        warn!("forceDestroy: forcibly destroying all location clients");
        let mut report = self.retire_all(&LocationError::ForceDestroyed);
        report.confirmation = Some(self.dispatcher().emit_teardown_handshake());
        info!(
            "forceDestroy complete: {} session(s) destroyed, {} fault(s) suppressed",
            report.released.len(),
            report.faults.len()
        );
        report
    }

    /// Releases both sessions without notifying listeners.
    ///
    /// Called when the hosting plugin is unloaded. A pending one-shot call
    /// is rejected with [`LocationError::PluginUnloaded`].
    pub fn shutdown(&self) -> TeardownReport {
        info!("shutdown: cleaning up all location clients");
        self.retire_all(&LocationError::PluginUnloaded)
    }

    fn retire_all(&self, reason: &LocationError) -> TeardownReport {
        let mut report = TeardownReport::default();
        for kind in [SessionKind::Watch, SessionKind::Once] {
            if let Some(session) = self.detach(kind, None) {
                self.close_route(&session, reason.clone());
                self.release(session, &mut report);
            }
        }
        report
    }
}
