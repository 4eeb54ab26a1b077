use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use futures::executor::block_on;

use super::*;

/// Signals `entered` when reached, then blocks until `release` fires.
type Gate = (mpsc::Sender<()>, mpsc::Receiver<()>);

fn pass(gate: &Mutex<Option<Gate>>) {
    let gate = gate.lock().unwrap().take();
    if let Some((entered, release)) = gate {
        entered.send(()).unwrap();
        release.recv().unwrap();
    }
}

#[derive(Default)]
struct FakeHandle {
    config: Option<SessionConfig>,
    listener: Mutex<Option<FixListener>>,
    deliver_on_start: Mutex<Option<Option<RawFix>>>,
    fail_start: bool,
    fail_stop: bool,
    start_gate: Mutex<Option<Gate>>,
    stop_gate: Mutex<Option<Gate>>,
    stops: AtomicUsize,
    destroys: AtomicUsize,
}

impl fmt::Debug for FakeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeHandle").finish_non_exhaustive()
    }
}

impl FakeHandle {
    fn kind(&self) -> SessionKind {
        self.config.as_ref().unwrap().kind()
    }

    fn is_destroyed(&self) -> bool {
        self.destroys.load(Ordering::SeqCst) > 0
    }

    /// Invokes the registered listener, even after destroy, like a late engine callback.
    fn emit(&self, raw: Option<RawFix>) {
        let listener = self.listener.lock().unwrap().clone();
        listener.expect("handle was never started")(raw);
    }
}

impl NativeHandle for FakeHandle {
    fn start(&self, listener: FixListener) -> Result<(), ProviderFault> {
        if self.fail_start {
            return Err(ProviderFault::new("start refused"));
        }
        pass(&self.start_gate);
        *self.listener.lock().unwrap() = Some(listener.clone());
        let scripted = self.deliver_on_start.lock().unwrap().take();
        if let Some(raw) = scripted {
            listener(raw);
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ProviderFault> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        pass(&self.stop_gate);
        if self.fail_stop {
            return Err(ProviderFault::new("stop failed"));
        }
        Ok(())
    }

    fn destroy(&self) -> Result<(), ProviderFault> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FakeProvider {
    handles: Mutex<Vec<Arc<FakeHandle>>>,
    next_delivery: Mutex<Option<Option<RawFix>>>,
    next_start_gate: Mutex<Option<Gate>>,
    fail_create: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    live_at_create: AtomicUsize,
}

impl FakeProvider {
    fn handles(&self) -> Vec<Arc<FakeHandle>> {
        self.handles.lock().unwrap().clone()
    }

    fn last(&self, kind: SessionKind) -> Arc<FakeHandle> {
        self.handles()
            .into_iter()
            .rev()
            .find(|handle| handle.kind() == kind)
            .expect("no handle of that kind")
    }

    /// Makes the next handle's `start` block until the returned sender fires.
    fn hold_next_start(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.next_start_gate.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    fn deliver_on_next_start(&self, raw: Option<RawFix>) {
        *self.next_delivery.lock().unwrap() = Some(raw);
    }
}

impl ComplianceApi for FakeProvider {
    fn update_privacy_show(&self, _contains: bool, _show: bool) -> Result<(), ComplianceFault> {
        Ok(())
    }

    fn update_privacy_agree(&self, _agree: bool) -> Result<(), ComplianceFault> {
        Ok(())
    }
}

impl FixProvider for FakeProvider {
    fn create_handle(&self, config: &SessionConfig) -> Result<Arc<dyn NativeHandle>, ProviderFault> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProviderFault::new("privacy not declared to sdk"));
        }

        let mut handles = self.handles.lock().unwrap();
        let live = handles
            .iter()
            .filter(|handle| handle.kind() == config.kind() && !handle.is_destroyed())
            .count();
        self.live_at_create.fetch_max(live, Ordering::SeqCst);

        let handle = Arc::new(FakeHandle {
            config: Some(config.clone()),
            deliver_on_start: Mutex::new(self.next_delivery.lock().unwrap().take()),
            start_gate: Mutex::new(self.next_start_gate.lock().unwrap().take()),
            fail_start: self.fail_start.load(Ordering::SeqCst),
            fail_stop: self.fail_stop.load(Ordering::SeqCst),
            ..FakeHandle::default()
        });
        handles.push(Arc::clone(&handle));
        Ok(handle)
    }
}

fn compliant_manager() -> (Arc<FakeProvider>, SessionManager, EventStream) {
    let provider = Arc::new(FakeProvider::default());
    let (manager, events) = SessionManager::new(provider.clone());
    assert!(manager.initialize_privacy());
    (provider, manager, events)
}

fn fix_at(lat: f64, lng: f64) -> RawFix {
    RawFix {
        lat,
        lng,
        accuracy: 15.0,
        ..RawFix::default()
    }
}

fn failed(code: i32, info: &str) -> RawFix {
    RawFix {
        error_code: code,
        error_info: info.into(),
        ..RawFix::default()
    }
}

fn drain(events: &EventStream) -> Vec<LocationEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

fn error_code(event: &LocationEvent) -> Option<EventCode> {
    match event {
        LocationEvent::Error(error) => Some(error.code),
        LocationEvent::Update(_) => None,
    }
}

async fn wait_for_handles(provider: &FakeProvider, count: usize) {
    while provider.handles().len() < count {
        tokio::task::yield_now().await;
    }
}

#[test]
fn sessions_require_privacy_compliance() {
    let provider = Arc::new(FakeProvider::default());
    let (manager, _events) = SessionManager::new(provider.clone());

    let once = block_on(manager.get_current_position(OnceOptions::default()));
    assert_eq!(once, Err(LocationError::PrivacyNotCompliant));
    assert_eq!(
        manager.start_watch(WatchOptions::default()),
        Err(LocationError::PrivacyNotCompliant)
    );
    assert!(provider.handles().is_empty());

    manager.update_privacy_show(true, true).unwrap();
    manager.update_privacy_agree(true).unwrap();
    assert!(manager.privacy_state().is_complete());
    assert!(manager.start_watch(WatchOptions::default()).is_ok());
}

#[test]
fn one_shot_resolves_with_gcj02_fix_and_destroys_handle() {
    let (provider, manager, _events) = compliant_manager();
    provider.deliver_on_next_start(Some(fix_at(31.23, 121.47)));

    let fix = block_on(manager.get_current_position(OnceOptions::default())).unwrap();

    assert_eq!(fix.lat, 31.23);
    assert_eq!(fix.lng, 121.47);
    assert_eq!(fix.accuracy, 15.0);
    assert_eq!(fix.coord_system, CoordSystem::Gcj02);

    let handle = provider.last(SessionKind::Once);
    assert_eq!(handle.stops.load(Ordering::SeqCst), 1);
    assert_eq!(handle.destroys.load(Ordering::SeqCst), 1);
    assert_eq!(manager.session_status(SessionKind::Once), SessionStatus::Destroyed);
}

#[test]
fn one_shot_config_matches_options() {
    let (provider, manager, _events) = compliant_manager();
    provider.deliver_on_next_start(Some(fix_at(1.0, 2.0)));

    let options = OnceOptions {
        mode: OnceMode::Precise,
        timeout_ms: 3000,
        cache_max_age_ms: 5000,
    };
    block_on(manager.get_current_position(options)).unwrap();

    let config = provider.last(SessionKind::Once).config.clone().unwrap();
    assert_eq!(config.timeout_ms, 3000);
    assert_eq!(config.accuracy, AccuracyProfile::HighAccuracy);
    assert!(!config.cache_enabled);
    assert!(config.once_location);
}

#[test]
fn one_shot_provider_error_is_surfaced_verbatim() {
    let (provider, manager, _events) = compliant_manager();
    provider.deliver_on_next_start(Some(failed(12, "no permission")));

    let err = block_on(manager.get_current_position(OnceOptions::default())).unwrap_err();

    assert_eq!(
        err,
        LocationError::Provider {
            code: 12,
            message: "no permission".into()
        }
    );
    assert!(provider.last(SessionKind::Once).is_destroyed());
}

#[test]
fn one_shot_null_fix_is_rejected() {
    let (provider, manager, _events) = compliant_manager();
    provider.deliver_on_next_start(None);

    let err = block_on(manager.get_current_position(OnceOptions::default())).unwrap_err();
    assert_eq!(err, LocationError::NullFix);
}

#[test]
fn zero_timeout_is_rejected_before_any_handle() {
    let (provider, manager, _events) = compliant_manager();
    let options = OnceOptions {
        timeout_ms: 0,
        ..OnceOptions::default()
    };

    let err = block_on(manager.get_current_position(options)).unwrap_err();
    assert!(matches!(err, LocationError::InvalidOptions(_)));
    assert!(provider.handles().is_empty());
}

#[tokio::test]
async fn superseded_one_shot_is_never_resolved_with_a_stale_fix() {
    let (provider, manager, _events) = compliant_manager();

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_current_position(OnceOptions::default()).await }
    });
    wait_for_handles(&provider, 1).await;
    let stale = provider.last(SessionKind::Once);

    let second = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_current_position(OnceOptions::default()).await }
    });
    wait_for_handles(&provider, 2).await;
    let current = provider.last(SessionKind::Once);

    assert!(stale.is_destroyed());
    assert_eq!(provider.live_at_create.load(Ordering::SeqCst), 0);

    stale.emit(Some(fix_at(1.0, 1.0)));
    current.emit(Some(fix_at(31.23, 121.47)));

    assert_eq!(first.await.unwrap(), Err(LocationError::Superseded));
    let fix = second.await.unwrap().unwrap();
    assert_eq!(fix.lat, 31.23);
}

#[test]
fn watch_stream_continues_through_provider_errors() {
    let (provider, manager, events) = compliant_manager();

    let watch_id = manager
        .start_watch(WatchOptions::new(WatchMode::Running))
        .unwrap();
    assert!(watch_id.as_str().starts_with("watch-"));

    let handle = provider.last(SessionKind::Watch);
    handle.emit(Some(fix_at(31.0, 121.0)));
    handle.emit(Some(failed(5, "weak signal")));
    handle.emit(Some(fix_at(31.1, 121.1)));

    let received = drain(&events);
    assert_eq!(received.len(), 3);
    assert!(matches!(&received[0], LocationEvent::Update(fix) if fix.lat == 31.0));
    assert_eq!(error_code(&received[1]), Some(EventCode::Provider(5)));
    assert!(matches!(&received[2], LocationEvent::Update(fix) if fix.lat == 31.1));
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Active);
}

#[test]
fn watch_drops_null_fixes() {
    let (provider, manager, events) = compliant_manager();
    manager.start_watch(WatchOptions::default()).unwrap();

    provider.last(SessionKind::Watch).emit(None);

    assert!(drain(&events).is_empty());
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Active);
}

#[test]
fn restarting_a_watch_destroys_the_previous_handle_first() {
    let (provider, manager, events) = compliant_manager();

    for _ in 0..4 {
        manager.start_watch(WatchOptions::default()).unwrap();
    }

    let handles = provider.handles();
    assert_eq!(handles.len(), 4);
    assert_eq!(provider.live_at_create.load(Ordering::SeqCst), 0);
    assert!(handles[..3].iter().all(|handle| handle.is_destroyed()));
    assert!(!handles[3].is_destroyed());

    handles[0].emit(Some(fix_at(1.0, 1.0)));
    assert!(drain(&events).is_empty());

    handles[3].emit(Some(fix_at(2.0, 2.0)));
    assert_eq!(drain(&events).len(), 1);
}

#[test]
fn stop_watch_is_idempotent() {
    let (provider, manager, events) = compliant_manager();

    let report = manager.stop_watch();
    assert!(report.is_clean());
    assert!(report.released.is_empty());

    manager.start_watch(WatchOptions::default()).unwrap();
    let report = manager.stop_watch();
    assert_eq!(report.released.len(), 1);
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Destroyed);

    let handle = provider.last(SessionKind::Watch);
    assert!(manager.stop_watch().released.is_empty());
    assert_eq!(handle.destroys.load(Ordering::SeqCst), 1);

    handle.emit(Some(fix_at(1.0, 1.0)));
    assert!(drain(&events).is_empty());
}

#[test]
fn stop_watch_swallows_provider_faults() {
    let (provider, manager, _events) = compliant_manager();
    provider.fail_stop.store(true, Ordering::SeqCst);
    manager.start_watch(WatchOptions::default()).unwrap();

    let report = manager.stop_watch();

    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].stage, TeardownStage::Stop);
    assert!(provider.last(SessionKind::Watch).is_destroyed());
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Destroyed);
}

#[test]
fn failed_watch_start_releases_the_handle() {
    let (provider, manager, _events) = compliant_manager();
    provider.fail_start.store(true, Ordering::SeqCst);

    let err = manager.start_watch(WatchOptions::default()).unwrap_err();

    assert!(matches!(err, LocationError::WatchStartFailed(_)));
    assert!(provider.last(SessionKind::Watch).is_destroyed());
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Destroyed);
}

#[test]
fn failed_client_construction_is_a_typed_rejection() {
    let (provider, manager, _events) = compliant_manager();
    provider.fail_create.store(true, Ordering::SeqCst);

    assert!(matches!(
        manager.start_watch(WatchOptions::default()),
        Err(LocationError::WatchStartFailed(_))
    ));
    assert!(matches!(
        block_on(manager.get_current_position(OnceOptions::default())),
        Err(LocationError::OnceStartFailed(_))
    ));
}

#[test]
fn force_destroy_without_sessions_still_handshakes() {
    let (_provider, manager, events) = compliant_manager();

    let report = manager.force_destroy();

    assert!(report.released.is_empty());
    let codes: Vec<_> = drain(&events).iter().map(error_code).collect();
    assert_eq!(
        codes,
        vec![
            Some(EventCode::ForceDestroy),
            Some(EventCode::ForceDestroyConfirmed)
        ]
    );
    assert_eq!(manager.session_status(SessionKind::Once), SessionStatus::Destroyed);
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Destroyed);
}

#[test]
fn each_force_destroy_numbers_its_confirmation() {
    let (_provider, manager, _events) = compliant_manager();

    assert_eq!(manager.force_destroy().confirmation, Some(1));
    assert_eq!(manager.stop_watch().confirmation, None);
    assert_eq!(manager.force_destroy().confirmation, Some(2));
    assert_eq!(manager.shutdown().confirmation, None);
}

#[tokio::test]
async fn force_destroy_rejects_pending_call_and_silences_watch() {
    let (provider, manager, events) = compliant_manager();
    manager.start_watch(WatchOptions::default()).unwrap();

    let pending = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_current_position(OnceOptions::default()).await }
    });
    wait_for_handles(&provider, 2).await;

    let report = manager.force_destroy();
    assert_eq!(report.released.len(), 2);
    assert_eq!(pending.await.unwrap(), Err(LocationError::ForceDestroyed));

    let watch = provider.last(SessionKind::Watch);
    let once = provider.last(SessionKind::Once);
    assert!(watch.is_destroyed() && once.is_destroyed());

    watch.emit(Some(fix_at(1.0, 1.0)));
    let received = drain(&events);
    assert_eq!(received.len(), 2);
    assert!(received[1].is_teardown_confirmation());
}

#[test]
fn force_destroy_attempts_every_handle_despite_faults() {
    let (provider, manager, events) = compliant_manager();
    provider.fail_stop.store(true, Ordering::SeqCst);
    provider.deliver_on_next_start(Some(fix_at(1.0, 1.0)));
    block_on(manager.get_current_position(OnceOptions::default())).unwrap();
    manager.start_watch(WatchOptions::default()).unwrap();

    let report = manager.force_destroy();

    assert_eq!(report.faults.len(), 1);
    assert!(provider.handles().iter().all(|handle| handle.is_destroyed()));
    assert_eq!(drain(&events).len(), 2);
}

#[test]
fn force_destroy_does_not_wait_for_a_hung_stop() {
    let (provider, manager, events) = compliant_manager();
    manager.start_watch(WatchOptions::default()).unwrap();
    let handle = provider.last(SessionKind::Watch);

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    *handle.stop_gate.lock().unwrap() = Some((entered_tx, release_rx));

    let stopper = thread::spawn({
        let manager = manager.clone();
        move || manager.stop_watch()
    });
    entered_rx.recv().unwrap();
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Stopping);

    let report = manager.force_destroy();
    assert_eq!(report.released.len(), 1);
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Destroyed);
    assert_eq!(drain(&events).len(), 2);

    release_tx.send(()).unwrap();
    let late = stopper.join().unwrap();
    assert!(late.released.is_empty());
    assert_eq!(handle.destroys.load(Ordering::SeqCst), 1);
}

#[test]
fn hung_start_does_not_block_stop_or_force_destroy() {
    let (provider, manager, events) = compliant_manager();
    let (entered, release) = provider.hold_next_start();

    let starter = thread::spawn({
        let manager = manager.clone();
        move || manager.start_watch(WatchOptions::default())
    });
    entered.recv().unwrap();
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Starting);

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn({
        let manager = manager.clone();
        move || {
            let stopped = manager.stop_watch();
            let forced = manager.force_destroy();
            done_tx.send((stopped, forced)).unwrap();
        }
    });
    let (stopped, forced) = done_rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("teardown blocked behind a hung start");
    assert_eq!(stopped.released.len(), 1);
    assert!(forced.released.is_empty());
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Destroyed);

    release.send(()).unwrap();
    assert!(starter.join().unwrap().is_ok());

    // The late start is undone, and nothing it reports reaches the stream.
    let handle = provider.last(SessionKind::Watch);
    assert_eq!(handle.destroys.load(Ordering::SeqCst), 2);
    assert_eq!(manager.session_status(SessionKind::Watch), SessionStatus::Destroyed);
    handle.emit(Some(fix_at(1.0, 1.0)));
    let codes: Vec<_> = drain(&events).iter().map(error_code).collect();
    assert_eq!(
        codes,
        vec![
            Some(EventCode::ForceDestroy),
            Some(EventCode::ForceDestroyConfirmed)
        ]
    );
}

#[test]
fn one_shot_torn_down_during_start_reports_the_teardown() {
    let (provider, manager, _events) = compliant_manager();
    let (entered, release) = provider.hold_next_start();

    let caller = thread::spawn({
        let manager = manager.clone();
        move || block_on(manager.get_current_position(OnceOptions::default()))
    });
    entered.recv().unwrap();

    let report = manager.force_destroy();
    assert_eq!(report.released.len(), 1);

    release.send(()).unwrap();
    assert_eq!(caller.join().unwrap(), Err(LocationError::ForceDestroyed));
    assert!(provider.last(SessionKind::Once).is_destroyed());
}

#[tokio::test]
async fn shutdown_rejects_pending_call_without_events() {
    let (provider, manager, events) = compliant_manager();

    let pending = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_current_position(OnceOptions::default()).await }
    });
    wait_for_handles(&provider, 1).await;

    manager.shutdown();

    assert_eq!(pending.await.unwrap(), Err(LocationError::PluginUnloaded));
    assert!(provider.last(SessionKind::Once).is_destroyed());
    assert!(drain(&events).is_empty());
}

#[test]
fn snapshot_exposes_watch_config() {
    let (_provider, manager, _events) = compliant_manager();
    let options = WatchOptions {
        mode: WatchMode::Browse,
        interval_ms: Some(7000),
        distance_filter_m: None,
    };
    manager.start_watch(options).unwrap();

    let snapshot = manager.session(SessionKind::Watch).unwrap();
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert_eq!(snapshot.config.interval_ms, 7000);
    assert_eq!(snapshot.config.distance_filter_m, 10);
    assert_eq!(snapshot.config.accuracy, AccuracyProfile::BatterySaving);
}
