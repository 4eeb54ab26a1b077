use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::{NativeHandle, SessionConfig, SessionKind};

/// Identifier of one session, unique for the lifetime of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier returned to consumers by `startWatch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WatchId(String);

impl WatchId {
    pub(crate) fn for_session(id: SessionId) -> Self {
        Self(format!("watch-{}", id.get()))
    }

    /// The identifier as sent over the bridge.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// Handle built, determinations being started.
    Starting,
    /// Determinations running.
    Active,
    /// Stop requested; the handle is still held.
    Stopping,
    /// Handle released. Terminal.
    Destroyed,
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: SessionId,
    /// Provider configuration.
    pub config: SessionConfig,
    /// Current status.
    pub status: SessionStatus,
}

pub(crate) struct Session {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) status: SessionStatus,
    handle: Option<Arc<dyn NativeHandle>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("has_handle", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn starting(
        id: SessionId,
        config: SessionConfig,
        handle: Arc<dyn NativeHandle>,
    ) -> Self {
        Self {
            id,
            config,
            status: SessionStatus::Starting,
            handle: Some(handle),
        }
    }

    pub(crate) const fn is_live(&self) -> bool {
        !matches!(self.status, SessionStatus::Destroyed)
    }

    /// Handle of a session that has not been destroyed.
    pub(crate) fn handle(&self) -> Option<Arc<dyn NativeHandle>> {
        if self.is_live() {
            self.handle.clone()
        } else {
            None
        }
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.status = SessionStatus::Destroyed;
        self.handle = None;
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            config: self.config.clone(),
            status: self.status,
        }
    }
}

/// At most one session of each kind. Destroyed records stay until replaced.
#[derive(Debug, Default)]
pub(crate) struct SessionTable {
    once: Option<Session>,
    watch: Option<Session>,
}

impl SessionTable {
    pub(crate) const fn slot(&self, kind: SessionKind) -> Option<&Session> {
        match kind {
            SessionKind::Once => self.once.as_ref(),
            SessionKind::Watch => self.watch.as_ref(),
        }
    }

    pub(crate) fn slot_mut(&mut self, kind: SessionKind) -> &mut Option<Session> {
        match kind {
            SessionKind::Once => &mut self.once,
            SessionKind::Watch => &mut self.watch,
        }
    }

    pub(crate) fn is_live(&self, kind: SessionKind, id: SessionId) -> bool {
        self.slot(kind)
            .is_some_and(|session| session.id == id && session.is_live())
    }

    /// The session of `kind` if it is `id` and still holds its handle.
    pub(crate) fn live_mut(&mut self, kind: SessionKind, id: SessionId) -> Option<&mut Session> {
        self.slot_mut(kind)
            .as_mut()
            .filter(|session| session.id == id && session.is_live())
    }
}
