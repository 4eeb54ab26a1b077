//! Routing of provider callbacks to pending calls and event listeners.
//!
//! Provider listeners never touch the session table. They come through here,
//! where a single mutex decides whether the session they belong to is still
//! current. Event emission happens under the same mutex, so once a route is
//! closed no late callback from that session can slip an event in behind a
//! teardown notification.

use std::sync::{Mutex, MutexGuard};

use futures::channel::oneshot;
use log::debug;

use crate::event::{ErrorEvent, EventSink, LocationEvent};
use crate::{Fix, LocationError, LocationResult, SessionId};

/// Receiver of a one-shot request outcome.
pub(crate) type OnceReceiver = oneshot::Receiver<LocationResult<Fix>>;

#[derive(Debug)]
struct PendingOnce {
    id: SessionId,
    sender: oneshot::Sender<LocationResult<Fix>>,
}

impl PendingOnce {
    fn settle(self, outcome: LocationResult<Fix>) {
        if self.sender.send(outcome).is_err() {
            debug!("once session {}: caller no longer waiting", self.id);
        }
    }
}

#[derive(Debug, Default)]
struct Routes {
    once: Option<PendingOnce>,
    watch: Option<SessionId>,
    confirmations: u64,
}

#[derive(Debug)]
pub(crate) struct Dispatcher {
    routes: Mutex<Routes>,
    sink: EventSink,
}

impl Dispatcher {
    pub(crate) fn new(sink: EventSink) -> Self {
        Self {
            routes: Mutex::new(Routes::default()),
            sink,
        }
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().expect("dispatch routes mutex poisoned")
    }

    /// Routes the outcome of `id` to a fresh receiver.
    ///
    /// A call still pending on an older session is rejected as superseded.
    pub(crate) fn open_once(&self, id: SessionId) -> OnceReceiver {
        let (sender, receiver) = oneshot::channel();
        let previous = self.routes().once.replace(PendingOnce { id, sender });
        if let Some(previous) = previous {
            previous.settle(Err(LocationError::Superseded));
        }
        receiver
    }

    /// Resolves the call pending on `id`. Returns `false` for a stale session.
    pub(crate) fn complete_once(&self, id: SessionId, outcome: LocationResult<Fix>) -> bool {
        let pending = self.routes().once.take_if(|pending| pending.id == id);
        pending.map(|pending| pending.settle(outcome)).is_some()
    }

    /// Rejects the call pending on `id`, if it is still pending.
    pub(crate) fn cancel_once(&self, id: SessionId, error: LocationError) -> bool {
        self.complete_once(id, Err(error))
    }

    pub(crate) fn open_watch(&self, id: SessionId) {
        self.routes().watch = Some(id);
    }

    pub(crate) fn close_watch(&self, id: SessionId) -> bool {
        self.routes().watch.take_if(|current| *current == id).is_some()
    }

    /// Emits `event` on behalf of watch session `id`. Returns `false` for a stale session.
    pub(crate) fn deliver_watch(&self, id: SessionId, event: LocationEvent) -> bool {
        let routes = self.routes();
        if routes.watch != Some(id) {
            return false;
        }
        self.sink.emit(event);
        true
    }

    /// Emits the two teardown notifications, in order.
    ///
    /// Returns the position of this confirmation among all confirmations
    /// emitted on the stream, starting at 1.
    pub(crate) fn emit_teardown_handshake(&self) -> u64 {
        let mut routes = self.routes();
        routes.confirmations += 1;
        self.sink.emit(LocationEvent::Error(ErrorEvent::force_destroy()));
        self.sink.emit(LocationEvent::Error(ErrorEvent::force_destroy_confirmed()));
        routes.confirmations
    }
}
