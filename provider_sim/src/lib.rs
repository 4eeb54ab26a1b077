//! Deterministic in-process positioning engine.
//!
//! [`SimProvider`] implements the `geobridge-location` provider contract
//! without any device behind it. Fixes are pushed by the caller, faults are
//! switched on and off, and every client it builds stays inspectable, which
//! makes it the engine of choice for integration tests and the CLI.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use geobridge_location::{
    ComplianceApi, ComplianceFault, FixListener, FixProvider, NativeHandle, ProviderFault,
    RawFix, SessionConfig, SessionKind,
};
use log::{debug, info};

/// Name reported in the `provider` field of simulated fixes.
pub const SIM_PROVIDER_NAME: &str = "sim";

/// Builds a successful fix record at `lat`/`lng`, stamped with the current time.
#[must_use]
pub fn sim_fix(lat: f64, lng: f64, accuracy: f64) -> RawFix {
    let time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
    RawFix {
        lat,
        lng,
        accuracy,
        time,
        location_type: 1,
        provider: Some(SIM_PROVIDER_NAME.to_string()),
        ..RawFix::default()
    }
}

/// Builds a failed determination carrying `code` and `info`.
#[must_use]
pub fn sim_failure(code: i32, info: impl Into<String>) -> RawFix {
    RawFix {
        error_code: code,
        error_info: info.into(),
        ..RawFix::default()
    }
}

/// Where a simulated client is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built, not started.
    Created,
    /// Determinations running.
    Started,
    /// Stopped at least once.
    Stopped,
    /// Released.
    Destroyed,
}

#[derive(Default)]
struct HandleState {
    lifecycle: Option<Lifecycle>,
    listener: Option<FixListener>,
    stops: usize,
    destroys: usize,
}

/// One client built by [`SimProvider`].
pub struct SimHandle {
    serial: u64,
    config: SessionConfig,
    state: Mutex<HandleState>,
    deliver_on_start: Mutex<Option<Option<RawFix>>>,
    stop_delay: Mutex<Option<Duration>>,
    fail_start: bool,
    fail_stop: bool,
}

impl fmt::Debug for SimHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimHandle")
            .field("serial", &self.serial)
            .field("kind", &self.config.kind())
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

impl SimHandle {
    fn state(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().expect("sim handle mutex poisoned")
    }

    /// Creation order across all clients of the provider, starting at 1.
    #[must_use]
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    /// Configuration the client was built with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.state().lifecycle.unwrap_or(Lifecycle::Created)
    }

    /// How many times `stop` was called.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.state().stops
    }

    /// How many times `destroy` was called.
    #[must_use]
    pub fn destroy_count(&self) -> usize {
        self.state().destroys
    }

    /// Delivers a determination to the registered listener.
    ///
    /// Returns `false` without delivering when the client was never started
    /// or has been destroyed.
    pub fn deliver(&self, raw: Option<RawFix>) -> bool {
        let listener = {
            let state = self.state();
            if state.lifecycle == Some(Lifecycle::Destroyed) {
                return false;
            }
            state.listener.clone()
        };
        listener.is_some_and(|listener| {
            listener(raw);
            true
        })
    }

    /// Delivers a determination even after destroy, as a misbehaving engine
    /// racing its own teardown would.
    pub fn deliver_late(&self, raw: Option<RawFix>) -> bool {
        let listener = self.state().listener.clone();
        listener.is_some_and(|listener| {
            listener(raw);
            true
        })
    }
}

impl NativeHandle for SimHandle {
    fn start(&self, listener: FixListener) -> Result<(), ProviderFault> {
        if self.fail_start {
            return Err(ProviderFault::new("simulated start failure"));
        }
        {
            let mut state = self.state();
            state.listener = Some(Arc::clone(&listener));
            state.lifecycle = Some(Lifecycle::Started);
        }
        debug!("sim client {} started", self.serial);

        let scripted = self
            .deliver_on_start
            .lock()
            .expect("sim script mutex poisoned")
            .take();
        if let Some(raw) = scripted {
            listener(raw);
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ProviderFault> {
        let delay = self
            .stop_delay
            .lock()
            .expect("sim stop delay mutex poisoned")
            .take();
        {
            let mut state = self.state();
            state.stops += 1;
            if state.lifecycle != Some(Lifecycle::Destroyed) {
                state.lifecycle = Some(Lifecycle::Stopped);
            }
        }
        if let Some(delay) = delay {
            info!("sim client {}: stop stalling for {delay:?}", self.serial);
            thread::sleep(delay);
        }
        if self.fail_stop {
            return Err(ProviderFault::new("simulated stop failure"));
        }
        debug!("sim client {} stopped", self.serial);
        Ok(())
    }

    fn destroy(&self) -> Result<(), ProviderFault> {
        let mut state = self.state();
        state.destroys += 1;
        state.lifecycle = Some(Lifecycle::Destroyed);
        debug!("sim client {} destroyed", self.serial);
        Ok(())
    }
}

/// Faults the next clients are built with.
#[derive(Debug, Clone, Default)]
struct Faults {
    reject_privacy: bool,
    fail_create: bool,
    fail_start: bool,
    fail_stop: bool,
    stop_delay: Option<Duration>,
}

/// A privacy declaration received through [`ComplianceApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivacyCall {
    /// `update_privacy_show(contains, show)`.
    Show {
        /// Whether the disclosure contains the location clause.
        contains: bool,
        /// Whether it was shown.
        show: bool,
    },
    /// `update_privacy_agree(agree)`.
    Agree(bool),
}

/// Scriptable positioning engine.
#[derive(Debug, Default)]
pub struct SimProvider {
    faults: Mutex<Faults>,
    handles: Mutex<Vec<Arc<SimHandle>>>,
    once_script: Mutex<VecDeque<Option<RawFix>>>,
    privacy_calls: Mutex<Vec<PrivacyCall>>,
    serial: AtomicU64,
}

impl SimProvider {
    /// Creates an engine with no faults and no scripted fixes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().expect("sim faults mutex poisoned")
    }

    /// Makes both privacy declaration calls fail.
    pub fn reject_privacy(&self, reject: bool) {
        self.faults().reject_privacy = reject;
    }

    /// Makes client construction fail.
    pub fn fail_create(&self, fail: bool) {
        self.faults().fail_create = fail;
    }

    /// Makes `start` fail on clients built from now on.
    pub fn fail_start(&self, fail: bool) {
        self.faults().fail_start = fail;
    }

    /// Makes `stop` fail on clients built from now on.
    pub fn fail_stop(&self, fail: bool) {
        self.faults().fail_stop = fail;
    }

    /// Makes the first `stop` of clients built from now on block for `delay`.
    pub fn stall_stop(&self, delay: Option<Duration>) {
        self.faults().stop_delay = delay;
    }

    /// Queues the determination the next one-shot client reports as soon as
    /// it is started.
    pub fn queue_once(&self, raw: Option<RawFix>) {
        self.once_script
            .lock()
            .expect("sim script mutex poisoned")
            .push_back(raw);
    }

    /// Every client built so far, in creation order.
    #[must_use]
    pub fn handles(&self) -> Vec<Arc<SimHandle>> {
        self.handles.lock().expect("sim handles mutex poisoned").clone()
    }

    /// The most recently built client of `kind`.
    #[must_use]
    pub fn latest(&self, kind: SessionKind) -> Option<Arc<SimHandle>> {
        self.handles()
            .into_iter()
            .rev()
            .find(|handle| handle.config.kind() == kind)
    }

    /// Clients of `kind` not destroyed yet.
    #[must_use]
    pub fn live_count(&self, kind: SessionKind) -> usize {
        self.handles()
            .iter()
            .filter(|handle| {
                handle.config.kind() == kind && handle.lifecycle() != Lifecycle::Destroyed
            })
            .count()
    }

    /// Delivers a determination to the latest client of `kind`.
    ///
    /// Returns `false` when there is no such client or it cannot deliver.
    pub fn push(&self, kind: SessionKind, raw: Option<RawFix>) -> bool {
        self.latest(kind).is_some_and(|handle| handle.deliver(raw))
    }

    /// Privacy declarations received so far.
    #[must_use]
    pub fn privacy_calls(&self) -> Vec<PrivacyCall> {
        self.privacy_calls
            .lock()
            .expect("sim privacy mutex poisoned")
            .clone()
    }

    fn record_privacy(&self, call: PrivacyCall) -> Result<(), ComplianceFault> {
        self.privacy_calls
            .lock()
            .expect("sim privacy mutex poisoned")
            .push(call);
        if self.faults().reject_privacy {
            return Err(ComplianceFault::new("simulated compliance failure"));
        }
        Ok(())
    }
}

impl ComplianceApi for SimProvider {
    fn update_privacy_show(&self, contains: bool, show: bool) -> Result<(), ComplianceFault> {
        self.record_privacy(PrivacyCall::Show { contains, show })
    }

    fn update_privacy_agree(&self, agree: bool) -> Result<(), ComplianceFault> {
        self.record_privacy(PrivacyCall::Agree(agree))
    }
}

impl FixProvider for SimProvider {
    fn create_handle(&self, config: &SessionConfig) -> Result<Arc<dyn NativeHandle>, ProviderFault> {
        let faults = self.faults().clone();
        if faults.fail_create {
            return Err(ProviderFault::new("simulated client construction failure"));
        }

        let deliver_on_start = match config.kind() {
            SessionKind::Once => self
                .once_script
                .lock()
                .expect("sim script mutex poisoned")
                .pop_front(),
            SessionKind::Watch => None,
        };

        let serial = self.serial.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = Arc::new(SimHandle {
            serial,
            config: config.clone(),
            state: Mutex::new(HandleState::default()),
            deliver_on_start: Mutex::new(deliver_on_start),
            stop_delay: Mutex::new(faults.stop_delay),
            fail_start: faults.fail_start,
            fail_stop: faults.fail_stop,
        });
        debug!("sim client {serial} created for {} session", config.kind());
        self.handles
            .lock()
            .expect("sim handles mutex poisoned")
            .push(Arc::clone(&handle));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use geobridge_location::{OnceOptions, WatchMode, WatchOptions};

    use super::*;

    #[test]
    fn scripted_once_fix_is_delivered_on_start() {
        let provider = SimProvider::new();
        provider.queue_once(Some(sim_fix(31.23, 121.47, 15.0)));

        let config = SessionConfig::once(&OnceOptions::default()).unwrap();
        let handle = provider.create_handle(&config).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handle
            .start(Arc::new(move |raw| sink.lock().unwrap().push(raw)))
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().unwrap().lat, 31.23);
    }

    #[test]
    fn destroyed_client_stops_delivering() {
        let provider = SimProvider::new();
        let config = SessionConfig::watch(&WatchOptions::new(WatchMode::Running)).unwrap();
        let handle = provider.create_handle(&config).unwrap();
        handle.start(Arc::new(|_| {})).unwrap();

        assert!(provider.push(SessionKind::Watch, Some(sim_fix(1.0, 2.0, 5.0))));
        handle.stop().unwrap();
        handle.destroy().unwrap();

        let sim = provider.latest(SessionKind::Watch).unwrap();
        assert_eq!(sim.lifecycle(), Lifecycle::Destroyed);
        assert!(!sim.deliver(None));
        assert!(sim.deliver_late(None));
        assert_eq!(provider.live_count(SessionKind::Watch), 0);
    }

    #[test]
    fn faults_apply_to_new_clients() {
        let provider = SimProvider::new();
        let config = SessionConfig::watch(&WatchOptions::default()).unwrap();

        provider.fail_create(true);
        assert!(provider.create_handle(&config).is_err());
        provider.fail_create(false);

        provider.fail_start(true);
        let handle = provider.create_handle(&config).unwrap();
        assert!(handle.start(Arc::new(|_| {})).is_err());

        provider.reject_privacy(true);
        assert!(provider.update_privacy_agree(true).is_err());
        assert_eq!(provider.privacy_calls(), vec![PrivacyCall::Agree(true)]);
    }
}
