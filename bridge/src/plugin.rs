use std::fmt;
use std::io;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use futures::channel::oneshot;
use futures::executor::block_on;
use futures::future::{Either, select};
use futures_timer::Delay;
use geobridge_location::{
    EventStream, Fix, FixProvider, OnceOptions, SessionManager, TeardownReport, WatchOptions,
};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::listeners::Registry;
use crate::options::decode;
use crate::shutdown::{PumpStop, PumpStopped};
use crate::{
    BridgeRejection, EventName, GetCurrentPositionOptions, ListenerHandle, PrivacyAgreeOptions,
    PrivacyShowOptions, StartWatchOptions, StartWatchResult,
};

/// How long [`LocationPlugin::safe_stop_watch`] waits for a graceful stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(2000);

/// Which path [`LocationPlugin::safe_stop_watch`] took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// `stopWatch` completed within the deadline.
    Stopped(TeardownReport),
    /// `stopWatch` timed out and every session was force destroyed.
    ForceDestroyed(TeardownReport),
}

impl StopOutcome {
    /// Whether the forced path was taken.
    #[must_use]
    pub const fn is_forced(&self) -> bool {
        matches!(self, Self::ForceDestroyed(_))
    }

    /// Report of the path that ran.
    #[must_use]
    pub const fn report(&self) -> &TeardownReport {
        match self {
            Self::Stopped(report) | Self::ForceDestroyed(report) => report,
        }
    }
}

/// Builder for [`LocationPlugin`].
#[derive(Debug, Clone)]
pub struct LocationPluginBuilder {
    auto_privacy: bool,
    stop_timeout: Duration,
}

impl Default for LocationPluginBuilder {
    fn default() -> Self {
        Self {
            auto_privacy: true,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl LocationPluginBuilder {
    /// Whether to declare privacy compliance at load. Defaults to `true`.
    #[must_use]
    pub const fn auto_privacy(mut self, enabled: bool) -> Self {
        self.auto_privacy = enabled;
        self
    }

    /// Deadline of [`LocationPlugin::safe_stop_watch`].
    #[must_use]
    pub const fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Loads the plugin on top of `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the event pump thread cannot be spawned.
    pub fn build(self, provider: Arc<dyn FixProvider>) -> io::Result<LocationPlugin> {
        let (manager, events) = SessionManager::new(provider);
        if self.auto_privacy {
            manager.initialize_privacy();
        }

        let listeners = Arc::new(Registry::default());
        let (stop, stopped) = PumpStop::new();
        let pump_listeners = Arc::clone(&listeners);
        thread::Builder::new()
            .name("geobridge-events".into())
            .spawn(move || pump(&events, &stopped, &pump_listeners))?;

        info!("location plugin loaded");
        Ok(LocationPlugin {
            manager,
            listeners,
            stop_timeout: self.stop_timeout,
            pump_stop: stop,
            unloaded: AtomicBool::new(false),
        })
    }
}

fn pump(events: &EventStream, stopped: &PumpStopped, listeners: &Registry) {
    debug!("event pump started");
    block_on(async {
        loop {
            let next = pin!(events.recv());
            let stop = pin!(stopped.wait());
            match select(next, stop).await {
                Either::Left((Ok(event), _)) => listeners.dispatch(&event),
                Either::Left((Err(_), _)) | Either::Right(_) => break,
            }
        }
    });
    debug!("event pump stopped");
}

/// The location plugin as seen from the web layer.
///
/// Wraps a [`SessionManager`], delivers its events to registered listeners
/// on a dedicated thread, and exposes every operation both as a typed method
/// and through the JSON [`invoke`](Self::invoke) entry point. Dropping the
/// plugin unloads it.
pub struct LocationPlugin {
    manager: SessionManager,
    listeners: Arc<Registry>,
    stop_timeout: Duration,
    pump_stop: PumpStop,
    unloaded: AtomicBool,
}

impl fmt::Debug for LocationPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationPlugin")
            .field("manager", &self.manager)
            .field("listeners", &self.listeners)
            .field("stop_timeout", &self.stop_timeout)
            .finish_non_exhaustive()
    }
}

impl LocationPlugin {
    /// Builder with privacy auto-initialisation on and the default stop deadline.
    #[must_use]
    pub fn builder() -> LocationPluginBuilder {
        LocationPluginBuilder::default()
    }

    /// Loads the plugin with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the event pump thread cannot be spawned.
    pub fn new(provider: Arc<dyn FixProvider>) -> io::Result<Self> {
        Self::builder().build(provider)
    }

    /// The underlying session manager.
    #[must_use]
    pub const fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// `updatePrivacyShow`.
    ///
    /// # Errors
    ///
    /// Rejects with `PRIVACY_UPDATE_FAILED` if the provider refuses.
    pub fn update_privacy_show(&self, options: PrivacyShowOptions) -> Result<(), BridgeRejection> {
        info!(
            "updatePrivacyShow: isContains={} isShow={}",
            options.is_contains, options.is_show
        );
        Ok(self
            .manager
            .update_privacy_show(options.is_contains, options.is_show)?)
    }

    /// `updatePrivacyAgree`.
    ///
    /// # Errors
    ///
    /// Rejects with `PRIVACY_UPDATE_FAILED` if the provider refuses.
    pub fn update_privacy_agree(
        &self,
        options: PrivacyAgreeOptions,
    ) -> Result<(), BridgeRejection> {
        info!("updatePrivacyAgree: isAgree={}", options.is_agree);
        Ok(self.manager.update_privacy_agree(options.is_agree)?)
    }

    /// `getCurrentPosition`.
    ///
    /// # Errors
    ///
    /// Rejects with the code of the [`LocationError`](geobridge_location::LocationError)
    /// the session ended with.
    pub async fn get_current_position(
        &self,
        options: GetCurrentPositionOptions,
    ) -> Result<Fix, BridgeRejection> {
        Ok(self
            .manager
            .get_current_position(OnceOptions::from(options))
            .await?)
    }

    /// `startWatch`.
    ///
    /// # Errors
    ///
    /// Rejects with `PRIVACY_NOT_COMPLIANT`, `INVALID_OPTIONS` or
    /// `WATCH_START_FAILED`.
    pub fn start_watch(
        &self,
        options: StartWatchOptions,
    ) -> Result<StartWatchResult, BridgeRejection> {
        let watch_id = self.manager.start_watch(WatchOptions::from(options))?;
        Ok(StartWatchResult { watch_id })
    }

    /// `stopWatch`. Never fails.
    pub fn stop_watch(&self) -> TeardownReport {
        self.manager.stop_watch()
    }

    /// `forceDestroy`. Never fails.
    pub fn force_destroy(&self) -> TeardownReport {
        self.manager.force_destroy()
    }

    /// Stops the watch, falling back to a forced teardown past the deadline.
    ///
    /// `stopWatch` runs on a helper thread. If it has not returned within the
    /// stop timeout, every session is force destroyed and all listeners are
    /// removed right after they have received the `FORCE_DESTROY_CONFIRMED`
    /// of that teardown. Confirmations of earlier teardowns still queued for
    /// delivery leave them in place. A stop that returns later is harmless.
    pub fn safe_stop_watch(&self) -> StopOutcome {
        let (done, confirmed) = oneshot::channel();
        let manager = self.manager.clone();
        let spawned = thread::Builder::new()
            .name("geobridge-stop".into())
            .spawn(move || {
                let report = manager.stop_watch();
                if done.send(report).is_err() {
                    debug!("stopWatch returned after its deadline");
                }
            });

        match spawned {
            Ok(_) => {
                let deadline = Delay::new(self.stop_timeout);
                if let Either::Left((Ok(report), _)) = block_on(select(confirmed, deadline)) {
                    info!("stopWatch confirmed");
                    return StopOutcome::Stopped(report);
                }
                warn!(
                    "stopWatch not confirmed in {}ms, forcing destroy",
                    self.stop_timeout.as_millis()
                );
            }
            Err(err) => error!("cannot run stopWatch: {err}; forcing destroy"),
        }

        let report = self.manager.force_destroy();
        if let Some(nth) = report.confirmation {
            self.listeners.detach_after_confirmation(nth);
        }
        StopOutcome::ForceDestroyed(report)
    }

    /// `addListener`.
    pub fn add_listener<F>(&self, event: EventName, handler: F) -> ListenerHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.listeners.add(event, Arc::new(handler));
        ListenerHandle::new(id, event, &self.listeners)
    }

    /// `removeAllListeners`.
    pub fn remove_all_listeners(&self) {
        let removed = self.listeners.clear();
        info!("removeAllListeners: removed {removed} listener(s)");
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Dispatches a bridge call by method name.
    ///
    /// `args` holds the camelCase JSON options; `null` means all defaults.
    /// Successful calls without a result return `null`.
    ///
    /// # Errors
    ///
    /// Rejects with `UNIMPLEMENTED` for unknown methods, `INVALID_OPTIONS`
    /// for undecodable arguments, and otherwise with the operation's own
    /// rejection.
    pub async fn invoke(&self, method: &str, args: Value) -> Result<Value, BridgeRejection> {
        debug!("invoke {method}: {args}");
        match method {
            "updatePrivacyShow" => {
                self.update_privacy_show(decode(method, args)?)?;
                Ok(Value::Null)
            }
            "updatePrivacyAgree" => {
                self.update_privacy_agree(decode(method, args)?)?;
                Ok(Value::Null)
            }
            "getCurrentPosition" => {
                let fix = self.get_current_position(decode(method, args)?).await?;
                Ok(encode(method, &fix))
            }
            "startWatch" => {
                let started = self.start_watch(decode(method, args)?)?;
                Ok(encode(method, &started))
            }
            "stopWatch" => {
                self.stop_watch();
                Ok(Value::Null)
            }
            "forceDestroy" => {
                self.force_destroy();
                Ok(Value::Null)
            }
            "removeAllListeners" => {
                self.remove_all_listeners();
                Ok(Value::Null)
            }
            other => {
                warn!("invoke: unknown method {other}");
                Err(BridgeRejection::unimplemented(other))
            }
        }
    }

    /// Releases every session and stops event delivery. Idempotent.
    ///
    /// A pending `getCurrentPosition` is rejected with `PLUGIN_UNLOADED`.
    pub fn unload(&self) {
        if self.unloaded.swap(true, Ordering::SeqCst) {
            return;
        }
        let report = self.manager.shutdown();
        self.pump_stop.signal();
        info!(
            "location plugin unloaded: {} session(s) released",
            report.released.len()
        );
    }
}

impl Drop for LocationPlugin {
    fn drop(&mut self) {
        self.unload();
    }
}

fn encode<T: Serialize>(method: &str, value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        error!("{method}: cannot encode result: {err}");
        Value::Null
    })
}
