//! Events delivered to bridge consumers and the channel that carries them.

use async_channel::{Receiver, Sender, unbounded};
use log::warn;
use serde::{Serialize, Serializer};

use crate::Fix;

/// Code of the notification emitted once a forced teardown has run.
pub const FORCE_DESTROY: &str = "FORCE_DESTROY";
/// Code of the notification confirming no further events will arrive.
pub const FORCE_DESTROY_CONFIRMED: &str = "FORCE_DESTROY_CONFIRMED";

/// Name of the event carrying a [`Fix`].
pub const LOCATION_UPDATE: &str = "locationUpdate";
/// Name of the event carrying an [`ErrorEvent`].
pub const LOCATION_ERROR: &str = "locationError";

/// Code carried by a `locationError` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    /// Transient provider failure during a watch session.
    Provider(i32),
    /// All sessions were forcibly destroyed.
    ForceDestroy,
    /// Forced teardown finished; listeners may be detached.
    ForceDestroyConfirmed,
}

impl Serialize for EventCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Provider(code) => serializer.serialize_i32(*code),
            Self::ForceDestroy => serializer.serialize_str(FORCE_DESTROY),
            Self::ForceDestroyConfirmed => serializer.serialize_str(FORCE_DESTROY_CONFIRMED),
        }
    }
}

/// Payload of a `locationError` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    /// What happened.
    pub code: EventCode,
    /// Human readable description.
    pub message: String,
}

impl ErrorEvent {
    /// A transient provider failure.
    pub fn provider(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: EventCode::Provider(code),
            message: message.into(),
        }
    }

    pub(crate) fn force_destroy() -> Self {
        Self {
            code: EventCode::ForceDestroy,
            message: "All location clients forcibly destroyed due to stop timeout".into(),
        }
    }

    pub(crate) fn force_destroy_confirmed() -> Self {
        Self {
            code: EventCode::ForceDestroyConfirmed,
            message: "All clients destroyed, listeners can be removed".into(),
        }
    }
}

/// An asynchronous notification for bridge listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LocationEvent {
    /// A watch session produced a fix.
    Update(Fix),
    /// A watch session failed transiently, or a forced teardown ran.
    Error(ErrorEvent),
}

impl LocationEvent {
    /// Bridge event name listeners subscribe to.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Update(_) => LOCATION_UPDATE,
            Self::Error(_) => LOCATION_ERROR,
        }
    }

    /// Whether this is the final notification of a forced teardown.
    #[must_use]
    pub const fn is_teardown_confirmation(&self) -> bool {
        matches!(
            self,
            Self::Error(ErrorEvent {
                code: EventCode::ForceDestroyConfirmed,
                ..
            })
        )
    }
}

/// Receiving end of the event channel.
pub type EventStream = Receiver<LocationEvent>;

/// Fire-and-forget event delivery.
///
/// The channel is unbounded so a provider callback never blocks on a slow
/// consumer, and events arrive in the order they were emitted.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<LocationEvent>,
}

impl EventSink {
    /// Creates a sink and the stream consumers read from.
    #[must_use]
    pub fn channel() -> (Self, EventStream) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    /// Queues an event for delivery.
    pub fn emit(&self, event: LocationEvent) {
        if let Err(err) = self.sender.try_send(event) {
            let reason = if err.is_closed() { "stream closed" } else { "stream full" };
            let event = err.into_inner();
            warn!("dropping {} event: {reason}", event.name());
        }
    }
}
