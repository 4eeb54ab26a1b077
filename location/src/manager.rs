//! Session lifecycle: one-shot requests and continuous watches.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use geobridge_privacy::{PrivacyGate, PrivacyState};
use log::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, OnceReceiver};
use crate::event::{ErrorEvent, EventSink, EventStream, LocationEvent};
use crate::session::{Session, SessionTable};
use crate::teardown::{TeardownReport, TeardownStage};
use crate::{
    Fix, FixListener, FixProvider, LocationError, LocationResult, NativeHandle, OnceOptions,
    ProviderFault, RawFix, SessionConfig, SessionId, SessionKind, SessionSnapshot, SessionStatus,
    WatchId, WatchOptions,
};

struct Inner {
    provider: Arc<dyn FixProvider>,
    privacy: PrivacyGate,
    table: Mutex<SessionTable>,
    // Serialise replacement per kind. Never held by stop or teardown paths.
    once_gate: Mutex<()>,
    watch_gate: Mutex<()>,
    dispatcher: Arc<Dispatcher>,
    next_id: AtomicU64,
}

/// Owner of the one-shot and watch sessions.
///
/// Cloning is cheap and every clone drives the same sessions. Handles are
/// only ever created, stopped and destroyed through this type.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("provider", &self.inner.provider)
            .field("privacy", &self.inner.privacy.state())
            .finish_non_exhaustive()
    }
}

/// A session taken out of service whose handle has not been released yet.
#[derive(Debug)]
pub(crate) struct Detached {
    pub(crate) kind: SessionKind,
    pub(crate) id: SessionId,
    handle: Arc<dyn NativeHandle>,
}

impl SessionManager {
    /// Creates a manager over `provider` and the stream its events arrive on.
    ///
    /// The privacy gate starts closed; see [`initialize_privacy`](Self::initialize_privacy).
    #[must_use]
    pub fn new(provider: Arc<dyn FixProvider>) -> (Self, EventStream) {
        let (sink, events) = EventSink::channel();
        let inner = Inner {
            provider,
            privacy: PrivacyGate::new(),
            table: Mutex::new(SessionTable::default()),
            once_gate: Mutex::new(()),
            watch_gate: Mutex::new(()),
            dispatcher: Arc::new(Dispatcher::new(sink)),
            next_id: AtomicU64::new(1),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            events,
        )
    }

    /// Load-time attempt to declare both privacy flags. Never fails.
    pub fn initialize_privacy(&self) -> bool {
        self.inner.privacy.initialize(self.inner.provider.as_ref())
    }

    /// Declares that the privacy disclosure was shown.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::PrivacyUpdateFailed`] if the provider rejects it.
    pub fn update_privacy_show(&self, contains: bool, show: bool) -> LocationResult<()> {
        self.inner
            .privacy
            .update_disclosure(self.inner.provider.as_ref(), contains, show)?;
        Ok(())
    }

    /// Declares that the user agreed to the privacy disclosure.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::PrivacyUpdateFailed`] if the provider rejects it.
    pub fn update_privacy_agree(&self, agree: bool) -> LocationResult<()> {
        self.inner
            .privacy
            .update_consent(self.inner.provider.as_ref(), agree)?;
        Ok(())
    }

    /// Current privacy declarations.
    #[must_use]
    pub fn privacy_state(&self) -> PrivacyState {
        self.inner.privacy.state()
    }

    /// Determines the current position once.
    ///
    /// A one-shot request still pending from an earlier call is torn down
    /// first and rejected with [`LocationError::Superseded`]. The handle is
    /// destroyed as soon as this call has an outcome, or when the returned
    /// future is dropped.
    ///
    /// # Errors
    ///
    /// - [`LocationError::PrivacyNotCompliant`] before both privacy declarations.
    /// - [`LocationError::InvalidOptions`] for a zero timeout.
    /// - [`LocationError::OnceStartFailed`] if the provider cannot build or start a client.
    /// - [`LocationError::NullFix`] or [`LocationError::Provider`] from the determination.
    /// - [`LocationError::Superseded`], [`LocationError::ForceDestroyed`] or
    ///   [`LocationError::PluginUnloaded`] when the session is torn down first.
    pub async fn get_current_position(&self, options: OnceOptions) -> LocationResult<Fix> {
        self.ensure_privacy()?;
        let config = SessionConfig::once(&options)?;
        info!(
            "getCurrentPosition: mode={:?} timeout={} cacheMaxAge={}",
            options.mode, options.timeout_ms, options.cache_max_age_ms
        );

        let (id, receiver) = self.open_once(config)?;
        let _release = ReleaseOnDrop {
            manager: self,
            kind: SessionKind::Once,
            id,
        };

        let outcome = receiver
            .await
            .unwrap_or(Err(LocationError::PluginUnloaded));
        match &outcome {
            Ok(fix) => info!(
                "getCurrentPosition success: lat={} lng={} accuracy={} type={}",
                fix.lat, fix.lng, fix.accuracy, fix.location_type
            ),
            Err(err) => warn!("getCurrentPosition session {id} rejected: {err}"),
        }
        outcome
    }

    fn open_once(&self, config: SessionConfig) -> LocationResult<(SessionId, OnceReceiver)> {
        let _gate = self.inner.once_gate.lock().expect("once gate mutex poisoned");
        self.replace(SessionKind::Once);

        let id = self.next_id();
        let receiver = self.inner.dispatcher.open_once(id);
        let listener = once_listener(Arc::clone(&self.inner.dispatcher), id);
        if let Err(fault) = self.launch(id, config, listener) {
            error!("getCurrentPosition failed: {fault}");
            let err = LocationError::OnceStartFailed(fault);
            self.inner.dispatcher.cancel_once(id, err.clone());
            self.retire(SessionKind::Once, id);
            return Err(err);
        }
        Ok((id, receiver))
    }

    /// Starts continuous updates, replacing any running watch session.
    ///
    /// Returns without waiting for a fix. Fixes arrive as `locationUpdate`
    /// events and transient failures as `locationError` events on the stream
    /// returned by [`new`](Self::new). A `stop_watch` or teardown that runs
    /// while the provider is still starting wins; the returned watch is then
    /// already destroyed.
    ///
    /// # Errors
    ///
    /// - [`LocationError::PrivacyNotCompliant`] before both privacy declarations.
    /// - [`LocationError::InvalidOptions`] for a zero interval.
    /// - [`LocationError::WatchStartFailed`] if the provider cannot build or start a client.
    pub fn start_watch(&self, options: WatchOptions) -> LocationResult<WatchId> {
        self.ensure_privacy()?;
        let config = SessionConfig::watch(&options)?;
        info!(
            "startWatch: mode={:?} interval={} distanceFilter={}",
            options.mode, config.interval_ms, config.distance_filter_m
        );

        let _gate = self.inner.watch_gate.lock().expect("watch gate mutex poisoned");
        self.replace(SessionKind::Watch);

        let id = self.next_id();
        self.inner.dispatcher.open_watch(id);
        let listener = watch_listener(Arc::clone(&self.inner.dispatcher), id);
        if let Err(fault) = self.launch(id, config, listener) {
            error!("startWatch failed: {fault}");
            self.inner.dispatcher.close_watch(id);
            self.retire(SessionKind::Watch, id);
            return Err(LocationError::WatchStartFailed(fault));
        }
        Ok(WatchId::for_session(id))
    }

    /// Stops the watch session. Idempotent and never fails.
    ///
    /// Provider faults are logged and listed in the returned report.
    pub fn stop_watch(&self) -> TeardownReport {
        info!("stopWatch called");
        let mut report = TeardownReport::default();
        match self.detach(SessionKind::Watch, None) {
            Some(watch) => {
                self.inner.dispatcher.close_watch(watch.id);
                self.release(watch, &mut report);
            }
            None => debug!("stopWatch: no active watch session"),
        }
        report
    }

    /// Snapshot of the latest session of `kind`, destroyed or not.
    #[must_use]
    pub fn session(&self, kind: SessionKind) -> Option<SessionSnapshot> {
        self.table().slot(kind).map(Session::snapshot)
    }

    /// Status of the session of `kind`.
    ///
    /// A kind that never had a session reports [`SessionStatus::Destroyed`].
    #[must_use]
    pub fn session_status(&self, kind: SessionKind) -> SessionStatus {
        self.table()
            .slot(kind)
            .map_or(SessionStatus::Destroyed, |session| session.status)
    }

    fn ensure_privacy(&self) -> LocationResult<()> {
        if self.inner.privacy.is_compliant() {
            Ok(())
        } else {
            error!("privacy compliance not completed; call updatePrivacyShow and updatePrivacyAgree first");
            Err(LocationError::PrivacyNotCompliant)
        }
    }

    fn next_id(&self) -> SessionId {
        SessionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn table(&self) -> MutexGuard<'_, SessionTable> {
        self.inner.table.lock().expect("session table mutex poisoned")
    }

    /// Builds and starts the handle of a new session.
    ///
    /// The table lock is only taken between provider calls, so a start stuck
    /// in the provider cannot block `stop_watch` or a teardown. A session
    /// retired while its start was in flight is released again once `start`
    /// returns, since the provider may have begun determinations after the
    /// teardown's destroy.
    fn launch(
        &self,
        id: SessionId,
        config: SessionConfig,
        listener: FixListener,
    ) -> Result<(), ProviderFault> {
        let kind = config.kind();
        let handle = self.inner.provider.create_handle(&config)?;
        *self.table().slot_mut(kind) = Some(Session::starting(id, config, Arc::clone(&handle)));
        debug!("{kind} session {id} created");

        handle.start(listener)?;

        // Anything but `Starting` means a stop or teardown got to it first.
        let retired = match self.table().live_mut(kind, id) {
            Some(session) if session.status == SessionStatus::Starting => {
                session.status = SessionStatus::Active;
                false
            }
            _ => true,
        };
        if retired {
            warn!("{kind} session {id} was torn down while starting, releasing its handle");
            for (stage, result) in [
                (TeardownStage::Stop, handle.stop()),
                (TeardownStage::Destroy, handle.destroy()),
            ] {
                if let Err(fault) = result {
                    debug!("{kind} session {id}: late {stage} failed: {fault}");
                }
            }
        }
        Ok(())
    }

    /// Fully destroys the current session of `kind` before a new one is built.
    fn replace(&self, kind: SessionKind) {
        if let Some(previous) = self.detach(kind, None) {
            info!("replacing {kind} session {}", previous.id);
            self.close_route(&previous, LocationError::Superseded);
            self.release(previous, &mut TeardownReport::default());
        }
    }

    /// Releases session `id` if it is still the live session of `kind`.
    pub(crate) fn retire(&self, kind: SessionKind, id: SessionId) {
        if let Some(session) = self.detach(kind, Some(id)) {
            self.release(session, &mut TeardownReport::default());
        }
    }

    /// Marks the live session of `kind` as stopping and hands out its handle.
    ///
    /// Sessions already stopping are included: their handle may be stuck in
    /// a stop call that never returned.
    pub(crate) fn detach(&self, kind: SessionKind, only: Option<SessionId>) -> Option<Detached> {
        let mut table = self.table();
        let session = table
            .slot_mut(kind)
            .as_mut()
            .filter(|session| session.is_live() && only.is_none_or(|id| session.id == id))?;
        let handle = session.handle()?;
        session.status = SessionStatus::Stopping;
        Some(Detached {
            kind,
            id: session.id,
            handle,
        })
    }

    /// Stops routing provider callbacks of a detached session to its consumer.
    pub(crate) fn close_route(&self, detached: &Detached, reason: LocationError) {
        match detached.kind {
            SessionKind::Once => {
                self.inner.dispatcher.cancel_once(detached.id, reason);
            }
            SessionKind::Watch => {
                self.inner.dispatcher.close_watch(detached.id);
            }
        }
    }

    /// Stops and destroys a detached handle, then marks its session destroyed.
    ///
    /// Each step is attempted independently; faults are logged and recorded.
    /// A step is skipped once another caller has destroyed the session.
    pub(crate) fn release(&self, detached: Detached, report: &mut TeardownReport) {
        let Detached { kind, id, handle } = detached;

        for stage in [TeardownStage::Stop, TeardownStage::Destroy] {
            if !self.table().is_live(kind, id) {
                debug!("{kind} session {id} already destroyed, skipping {stage}");
                return;
            }
            let result = match stage {
                TeardownStage::Stop => handle.stop(),
                TeardownStage::Destroy => handle.destroy(),
            };
            if let Err(fault) = result {
                warn!("{kind} session {id}: {stage} failed: {fault}");
                report.record(kind, id, stage, fault);
            }
        }
        drop(handle);

        if let Some(session) = self.table().live_mut(kind, id) {
            session.mark_destroyed();
            report.released.push((kind, id));
            debug!("{kind} session {id} destroyed");
        }
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

struct ReleaseOnDrop<'a> {
    manager: &'a SessionManager,
    kind: SessionKind,
    id: SessionId,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.manager.retire(self.kind, self.id);
    }
}

fn once_listener(dispatcher: Arc<Dispatcher>, id: SessionId) -> FixListener {
    Arc::new(move |raw: Option<RawFix>| {
        let outcome = match raw {
            None => {
                error!("once session {id}: null location returned");
                Err(LocationError::NullFix)
            }
            Some(raw) => raw.into_fix().map_err(|failure| {
                error!(
                    "once session {id}: location error code={} info={}",
                    failure.code, failure.message
                );
                LocationError::from(failure)
            }),
        };

        if !dispatcher.complete_once(id, outcome) {
            debug!("once session {id}: ignoring stale callback");
        }
    })
}

fn watch_listener(dispatcher: Arc<Dispatcher>, id: SessionId) -> FixListener {
    Arc::new(move |raw: Option<RawFix>| {
        let Some(raw) = raw else {
            debug!("watch session {id}: dropping null location");
            return;
        };

        let event = match raw.into_fix() {
            Ok(fix) => LocationEvent::Update(fix),
            Err(failure) => {
                warn!(
                    "watch session {id}: error code={} info={}",
                    failure.code, failure.message
                );
                LocationEvent::Error(ErrorEvent::provider(failure.code, failure.message))
            }
        };

        if !dispatcher.deliver_watch(id, event) {
            debug!("watch session {id}: ignoring stale callback");
        }
    })
}
