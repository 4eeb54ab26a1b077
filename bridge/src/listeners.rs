//! Listener registry for `locationUpdate` and `locationError` events.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use geobridge_location::LocationEvent;
use geobridge_location::event::{LOCATION_ERROR, LOCATION_UPDATE};
use log::{debug, info, warn};
use serde_json::Value;

/// Event a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A fix from the watch session.
    LocationUpdate,
    /// A watch failure or a forced teardown notification.
    LocationError,
}

impl EventName {
    /// Name used on the bridge.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocationUpdate => LOCATION_UPDATE,
            Self::LocationError => LOCATION_ERROR,
        }
    }

    const fn of(event: &LocationEvent) -> Self {
        match event {
            LocationEvent::Update(_) => Self::LocationUpdate,
            LocationEvent::Error(_) => Self::LocationError,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an event name the plugin never emits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event `{0}`")]
pub struct UnknownEvent(pub String);

impl FromStr for EventName {
    type Err = UnknownEvent;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            LOCATION_UPDATE => Ok(Self::LocationUpdate),
            LOCATION_ERROR => Ok(Self::LocationError),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

struct Entry {
    id: u64,
    event: EventName,
    handler: Handler,
}

#[derive(Default)]
struct State {
    next_id: u64,
    entries: Vec<Entry>,
    confirmations: u64,
    detach_at: Option<u64>,
}

impl State {
    fn detach_all(&mut self) {
        self.detach_at = None;
        let removed = std::mem::take(&mut self.entries).len();
        info!("teardown confirmed, removed {removed} listener(s)");
    }
}

/// Registered listeners, shared between the plugin and its pump thread.
#[derive(Default)]
pub(crate) struct Registry {
    state: Mutex<State>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Registry")
            .field("listeners", &state.entries.len())
            .field("confirmations", &state.confirmations)
            .field("detach_at", &state.detach_at)
            .finish()
    }
}

impl Registry {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("listener registry mutex poisoned")
    }

    pub(crate) fn add(&self, event: EventName, handler: Handler) -> u64 {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.entries.push(Entry { id, event, handler });
        debug!("listener {id} added for {event}");
        id
    }

    fn remove(&self, id: u64) -> bool {
        let mut state = self.state();
        let before = state.entries.len();
        state.entries.retain(|entry| entry.id != id);
        state.entries.len() != before
    }

    pub(crate) fn clear(&self) -> usize {
        let mut state = self.state();
        state.detach_at = None;
        std::mem::take(&mut state.entries).len()
    }

    pub(crate) fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Removes every listener once the `nth` teardown confirmation of the
    /// stream has been delivered to them, or right away if it already was.
    pub(crate) fn detach_after_confirmation(&self, nth: u64) {
        let mut state = self.state();
        if state.confirmations >= nth {
            state.detach_all();
        } else {
            state.detach_at = Some(nth);
        }
    }

    /// Calls every listener subscribed to `event`. Runs on the pump thread.
    pub(crate) fn dispatch(&self, event: &LocationEvent) {
        let name = EventName::of(event);
        match serde_json::to_value(event) {
            Ok(payload) => self.notify(name, &payload),
            Err(err) => warn!("dropping {name} event: {err}"),
        }

        // Counted even when undeliverable, so positions stay in step with the stream.
        if event.is_teardown_confirmation() {
            let mut state = self.state();
            state.confirmations += 1;
            let seen = state.confirmations;
            if state.detach_at.is_some_and(|nth| seen >= nth) {
                state.detach_all();
            }
        }
    }

    fn notify(&self, name: EventName, payload: &Value) {
        // Handlers run unlocked so they may register or remove listeners.
        let handlers: Vec<Handler> = self
            .state()
            .entries
            .iter()
            .filter(|entry| entry.event == name)
            .map(|entry| Arc::clone(&entry.handler))
            .collect();
        for handler in handlers {
            handler(payload);
        }
    }
}

/// Subscription returned by `add_listener`.
///
/// Dropping the handle keeps the listener registered; call
/// [`remove`](Self::remove) to unsubscribe.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: u64,
    event: EventName,
    registry: Weak<Registry>,
}

impl ListenerHandle {
    pub(crate) fn new(id: u64, event: EventName, registry: &Arc<Registry>) -> Self {
        Self {
            id,
            event,
            registry: Arc::downgrade(registry),
        }
    }

    /// Event this listener is subscribed to.
    #[must_use]
    pub const fn event(&self) -> EventName {
        self.event
    }

    /// Unsubscribes. Returns `false` if the listener was already gone.
    pub fn remove(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id))
    }
}
