//! Session registry: which run owns which in-flight process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use events::EventSender;
use node_core::SessionId;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::process::ProcessHandle;

pub const CANCELLED_MESSAGE: &str = "Command cancelled by user";
pub const NO_ACTIVE_COMMAND: &str = "no active command to cancel";

/// One run in flight.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    events: EventSender,
    process: Mutex<Option<ProcessHandle>>,
    cancelled: AtomicBool,
    started_at: DateTime<Utc>,
}

impl Session {
    fn new(events: EventSender) -> Self {
        Self {
            id: events.session_id(),
            events,
            process: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The live process, if any.
    pub fn active_process(&self) -> Option<ProcessHandle> {
        self.process_slot()
            .as_ref()
            .filter(|handle| handle.is_live())
            .cloned()
    }

    fn process_slot(&self) -> std::sync::MutexGuard<'_, Option<ProcessHandle>> {
        self.process
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn summary(&self) -> SessionSummary {
        let current = self.active_process();
        SessionSummary {
            id: self.id,
            running: current.is_some(),
            current_step: current.map(|handle| handle.label().to_string()),
            started_at: self.started_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub running: bool,
    pub current_step: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NoActiveCommand,
}

/// Maps session ids to their runs.
///
/// All lookups, inserts and removals happen under one lock, so a client
/// cancel and a natural process exit for the same session never interleave.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new run streaming to `events`.
    pub fn open(&self, events: EventSender) -> Result<Arc<Session>> {
        let mut sessions = self.lock();
        let id = events.session_id();
        if sessions.contains_key(&id) {
            return Err(OrchestratorError::SessionExists(id));
        }

        let session = Arc::new(Session::new(events));
        sessions.insert(id, Arc::clone(&session));
        debug!(session_id = %id, "Session opened");
        Ok(session)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Hand a freshly created process to its session.
    pub fn register(&self, id: &SessionId, handle: ProcessHandle) -> Result<()> {
        let sessions = self.lock();
        let Some(session) = sessions.get(id) else {
            return Err(OrchestratorError::SessionNotFound(*id));
        };
        if session.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let mut slot = session.process_slot();
        if slot.as_ref().is_some_and(|current| current.is_live()) {
            return Err(OrchestratorError::SessionBusy(*id));
        }
        *slot = Some(handle);
        Ok(())
    }

    /// Drop the session's reference to `handle` once it has been reaped.
    pub fn release(&self, id: &SessionId, handle: &ProcessHandle) {
        let sessions = self.lock();
        if let Some(session) = sessions.get(id) {
            let mut slot = session.process_slot();
            if slot.as_ref().is_some_and(|current| current.same_as(handle)) {
                *slot = None;
            }
        }
    }

    /// Interrupt the session's live process and close its stream.
    pub fn cancel(&self, id: &SessionId) -> CancelOutcome {
        let mut sessions = self.lock();
        let Some(handle) = sessions.get(id).and_then(|session| session.active_process()) else {
            debug!(session_id = %id, "Cancel requested without an active command");
            return CancelOutcome::NoActiveCommand;
        };

        if let Some(session) = sessions.remove(id) {
            session.cancelled.store(true, Ordering::SeqCst);
            handle.interrupt();
            session.events.cancelled(CANCELLED_MESSAGE);
            info!(session_id = %id, step = %handle.label(), "Session cancelled");
        }
        CancelOutcome::Cancelled
    }

    /// The client's stream went away.
    ///
    /// A live process is cancelled exactly like an explicit request. A run
    /// sitting between steps is marked cancelled so no further step starts.
    pub fn on_disconnect(&self, id: &SessionId) -> CancelOutcome {
        if self.cancel(id) == CancelOutcome::Cancelled {
            return CancelOutcome::Cancelled;
        }

        if let Some(session) = self.lock().remove(id) {
            session.cancelled.store(true, Ordering::SeqCst);
            debug!(session_id = %id, "Idle session dropped on disconnect");
        }
        CancelOutcome::NoActiveCommand
    }

    /// Remove a session whose run reached a terminal state on its own.
    pub fn finish(&self, id: &SessionId) {
        if self.lock().remove(id).is_some() {
            debug!(session_id = %id, "Session finished");
        }
    }

    pub fn active_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> =
            self.lock().values().map(|session| session.summary()).collect();
        summaries.sort_by_key(|summary| summary.started_at);
        summaries
    }
}
