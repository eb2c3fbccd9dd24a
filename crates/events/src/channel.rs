//! Per-session event channel built on an unbounded tokio mpsc queue

use std::sync::{Arc, Mutex};

use node_core::SessionId;
use tokio::sync::mpsc;

use crate::types::RunEvent;

/// Create the producer and consumer halves of one session's stream.
pub fn event_channel(session_id: SessionId) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = EventSender {
        session_id,
        tx,
        terminated: Arc::new(Mutex::new(false)),
    };
    (sender, EventReceiver { session_id, rx })
}

/// Producer half of a session's stream.
///
/// Sending never blocks. Once a terminal event went out, every later event is
/// dropped, so the terminal event is always the last one a client observes.
#[derive(Clone)]
pub struct EventSender {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<RunEvent>,
    /// Held while sending so a terminal event cannot interleave with output
    terminated: Arc<Mutex<bool>>,
}

impl EventSender {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Send an event, returning whether it was accepted.
    pub fn send(&self, event: RunEvent) -> bool {
        let mut terminated = self
            .terminated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if *terminated {
            tracing::debug!(
                session_id = %self.session_id,
                kind = ?event.kind,
                "Dropping event after terminal event"
            );
            return false;
        }
        if event.is_terminal() {
            *terminated = true;
        }

        // A closed receiver means the client went away; the run still finishes.
        self.tx.send(event).is_ok()
    }

    pub fn stdout(&self, data: impl Into<String>) -> bool {
        self.send(RunEvent::stdout(self.session_id, data))
    }

    pub fn stderr(&self, data: impl Into<String>) -> bool {
        self.send(RunEvent::stderr(self.session_id, data))
    }

    /// Terminal error event.
    pub fn fail(&self, data: impl Into<String>) -> bool {
        self.send(RunEvent::error(self.session_id, data))
    }

    pub fn complete(&self, data: impl Into<String>) -> bool {
        self.send(RunEvent::complete(self.session_id, data))
    }

    pub fn cancelled(&self, data: impl Into<String>) -> bool {
        self.send(RunEvent::cancelled(self.session_id, data))
    }

    pub fn is_terminated(&self) -> bool {
        *self
            .terminated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("session_id", &self.session_id)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Consumer half of a session's stream.
#[derive(Debug)]
pub struct EventReceiver {
    session_id: SessionId,
    rx: mpsc::UnboundedReceiver<RunEvent>,
}

impl EventReceiver {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.rx.recv().await
    }

    /// Take every event that is already queued without waiting.
    pub fn drain(&mut self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    #[tokio::test]
    async fn test_send_receive_in_order() {
        let (tx, mut rx) = event_channel(SessionId::new());

        assert!(tx.stdout("one"));
        assert!(tx.stderr("two"));
        assert!(tx.complete("done"));

        let kinds: Vec<EventKind> = rx.drain().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Stdout, EventKind::Stderr, EventKind::Complete]
        );
    }

    #[tokio::test]
    async fn test_events_after_terminal_are_dropped() {
        let (tx, mut rx) = event_channel(SessionId::new());

        assert!(tx.cancelled("cancelled by user"));
        assert!(!tx.stdout("late output"));
        assert!(!tx.fail("late failure"));
        assert!(tx.is_terminated());

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Cancelled);
    }

    #[tokio::test]
    async fn test_clones_share_terminal_latch() {
        let (tx, mut rx) = event_channel(SessionId::new());
        let other = tx.clone();

        tx.complete("done");
        assert!(!other.stdout("after"));
        assert_eq!(rx.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_receiver_ends_when_senders_dropped() {
        let (tx, mut rx) = event_channel(SessionId::new());
        tx.stdout("hello");
        drop(tx);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_to_closed_receiver() {
        let (tx, rx) = event_channel(SessionId::new());
        drop(rx);

        assert!(!tx.stdout("nobody listens"));
    }

    #[test]
    fn test_events_carry_session_id() {
        let id = SessionId::new();
        let (tx, mut rx) = event_channel(id);
        tx.stdout("x");

        assert_eq!(rx.session_id(), id);
        assert_eq!(rx.drain()[0].session_id, id);
    }
}
