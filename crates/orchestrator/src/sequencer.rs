//! Runs ordered step lists for a session, one process at a time.

use std::sync::Arc;

use events::event_channel;
use node_core::{SessionId, StepDescriptor};
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::process::{CommandSpec, Elevation, ProcessHandle, ProcessRunner};
use crate::registry::{Session, SessionRegistry};

pub struct CommandSequencer {
    runner: Arc<dyn ProcessRunner>,
    registry: Arc<SessionRegistry>,
    elevation: Elevation,
}

impl CommandSequencer {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        registry: Arc<SessionRegistry>,
        elevation: Elevation,
    ) -> Self {
        Self {
            runner,
            registry,
            elevation,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Run `steps` in order without emitting a terminal event.
    ///
    /// Stops at the first failing step that does not allow failure, and as
    /// soon as the session is cancelled.
    pub async fn run_steps(&self, session: &Session, steps: &[StepDescriptor]) -> Result<()> {
        for step in steps {
            if session.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            self.run_step(session, step).await?;
        }
        Ok(())
    }

    /// Run `steps` and close the session's stream with the outcome.
    pub async fn run(&self, session: &Session, steps: &[StepDescriptor]) -> Result<()> {
        let result = self.run_steps(session, steps).await;
        self.settle(session, &result, "All steps completed");
        result
    }

    /// Emit the terminal event for `result` and forget the session.
    ///
    /// Cancellation already produced its terminal event when it was requested.
    pub fn settle(&self, session: &Session, result: &Result<()>, success_message: &str) {
        match result {
            Ok(()) => {
                session.events().complete(success_message);
            }
            Err(OrchestratorError::Cancelled) => {}
            Err(err) => {
                session.events().fail(err.to_string());
            }
        }
        self.registry.finish(&session.id());
    }

    async fn run_step(&self, session: &Session, step: &StepDescriptor) -> Result<()> {
        let events = session.events();
        let session_id = session.id();
        events.stdout(format!("==> {}", step.description()));

        let handle = ProcessHandle::new(step.description());
        if let Err(err) = self.registry.register(&session_id, handle.clone()) {
            if session.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            return Err(err);
        }

        let command = CommandSpec::from_step(step, &self.elevation);
        debug!(
            session_id = %session_id,
            command = %step.command_line(),
            elevated = step.is_elevated(),
            "Running step"
        );
        let result = self.runner.run(&command, &handle, events).await;
        handle.mark_finished();
        self.registry.release(&session_id, &handle);

        let interrupted = result.as_ref().is_err_and(|err| err.is_interrupted());
        if session.is_cancelled() || interrupted || handle.is_interrupted() {
            return Err(OrchestratorError::Cancelled);
        }

        match result {
            Ok(_) => Ok(()),
            Err(err) if step.is_failure_allowed() => {
                warn!(
                    session_id = %session_id,
                    step = %step.description(),
                    exit_code = ?err.exit_code(),
                    error = %err,
                    "Tolerated step failure"
                );
                events.stdout(format!(
                    "{} failed ({err}), continuing despite error",
                    step.description()
                ));
                Ok(())
            }
            Err(err) => Err(OrchestratorError::aborted(
                step.description(),
                err.to_string(),
            )),
        }
    }

    /// Fire-and-forget steps outside any session; output goes to the log.
    ///
    /// Every step is attempted even when an earlier one fails.
    pub async fn run_detached(&self, steps: &[StepDescriptor]) {
        for step in steps {
            let (sink, mut output) = event_channel(SessionId::new());
            let handle = ProcessHandle::new(step.description());
            let command = CommandSpec::from_step(step, &self.elevation);

            let result = self.runner.run(&command, &handle, &sink).await;
            for event in output.drain() {
                debug!(step = %step.description(), kind = ?event.kind, "{}", event.data);
            }

            match result {
                Ok(_) => info!(step = %step.description(), "Detached step finished"),
                Err(err) => warn!(
                    step = %step.description(),
                    error = %err,
                    "Detached step failed"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CancelOutcome;
    use crate::test_support::{FakeRunner, Outcome};
    use events::{EventKind, EventReceiver, RunEvent};

    fn sequencer(runner: Arc<FakeRunner>) -> CommandSequencer {
        CommandSequencer::new(runner, Arc::new(SessionRegistry::new()), Elevation::default())
    }

    fn open(sequencer: &CommandSequencer) -> (Arc<Session>, EventReceiver) {
        let (tx, rx) = event_channel(SessionId::new());
        (sequencer.registry().open(tx).unwrap(), rx)
    }

    fn terminal(events: &[RunEvent]) -> Vec<&RunEvent> {
        events.iter().filter(|e| e.is_terminal()).collect()
    }

    #[tokio::test]
    async fn test_runs_steps_in_order_and_completes() {
        let runner = Arc::new(FakeRunner::new().when("echo one", Outcome::Succeed(vec!["one"])));
        let sequencer = sequencer(runner.clone());
        let (session, mut rx) = open(&sequencer);
        let steps = vec![
            StepDescriptor::new("First", "echo").arg("one"),
            StepDescriptor::new("Second", "echo").arg("two"),
        ];

        sequencer.run(&session, &steps).await.unwrap();

        assert_eq!(runner.calls(), vec!["echo one", "echo two"]);
        let events = rx.drain();
        let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(
            data,
            vec!["==> First", "one", "==> Second", "All steps completed"]
        );
        assert_eq!(events.last().unwrap().kind, EventKind::Complete);
        assert!(events.iter().all(|e| e.kind != EventKind::Error));
        assert!(!sequencer.registry().contains(&session.id()));
    }

    #[tokio::test]
    async fn test_tolerated_failure_event_order() {
        let runner = Arc::new(
            FakeRunner::new()
                .when("step-a", Outcome::Succeed(vec!["a"]))
                .when("step-b", Outcome::Succeed(vec!["b"]))
                .when("step-c", Outcome::SpawnFailure)
                .when("step-d", Outcome::Succeed(vec!["d"])),
        );
        let sequencer = sequencer(runner.clone());
        let (session, mut rx) = open(&sequencer);
        let steps = vec![
            StepDescriptor::new("First", "step-a"),
            StepDescriptor::new("Second", "step-b"),
            StepDescriptor::new("Third", "step-c").allow_failure(),
            StepDescriptor::new("Fourth", "step-d"),
        ];

        sequencer.run(&session, &steps).await.unwrap();

        let events = rx.drain();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        let mut expected = vec![EventKind::Stdout; 8];
        expected.push(EventKind::Complete);
        assert_eq!(kinds, expected);

        let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(
            &data[..5],
            &["==> First", "a", "==> Second", "b", "==> Third"]
        );
        assert!(data[5].starts_with("Third failed ("));
        assert!(data[5].ends_with("continuing despite error"));
        assert_eq!(&data[6..], &["==> Fourth", "d", "All steps completed"]);
        assert_eq!(runner.call_count(), 4);
    }

    #[tokio::test]
    async fn test_failure_mid_sequence_runs_only_preceding_steps() {
        let runner = Arc::new(FakeRunner::new().when("step-c", Outcome::Exit(2)));
        let sequencer = sequencer(runner.clone());
        let (session, mut rx) = open(&sequencer);
        let steps = vec![
            StepDescriptor::new("First", "step-a"),
            StepDescriptor::new("Second", "step-b"),
            StepDescriptor::new("Third", "step-c"),
            StepDescriptor::new("Fourth", "step-d"),
        ];

        let err = sequencer.run(&session, &steps).await.unwrap_err();

        assert_eq!(runner.calls(), vec!["step-a", "step-b", "step-c"]);
        match err {
            OrchestratorError::SequenceAborted { step, .. } => assert_eq!(step, "Third"),
            other => panic!("unexpected error: {other:?}"),
        }

        let events = rx.drain();
        let terminal = terminal(&events);
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].kind, EventKind::Error);
        assert!(terminal[0].data.starts_with("Third failed"));
        assert!(events.iter().all(|e| e.data != "==> Fourth"));
    }

    #[tokio::test]
    async fn test_elevated_steps_are_wrapped() {
        let runner = Arc::new(FakeRunner::new());
        let sequencer = sequencer(runner.clone());
        let (session, _rx) = open(&sequencer);
        let steps = vec![StepDescriptor::new("Reload", "systemctl")
            .arg("daemon-reload")
            .elevated()];

        sequencer.run(&session, &steps).await.unwrap();
        assert_eq!(runner.calls(), vec!["sudo systemctl daemon-reload"]);
    }

    #[tokio::test]
    async fn test_required_failure_aborts_sequence() {
        let runner = Arc::new(FakeRunner::new().when("apt-get install", Outcome::Exit(100)));
        let sequencer = sequencer(runner.clone());
        let (session, mut rx) = open(&sequencer);
        let steps = vec![
            StepDescriptor::new("Install pod package", "apt-get").args(["install", "-y", "pod"]),
            StepDescriptor::new("Start pod service", "systemctl").args(["start", "pod"]),
        ];

        let err = sequencer.run(&session, &steps).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::SequenceAborted { .. }));
        assert_eq!(runner.call_count(), 1);

        let events = rx.drain();
        let terminal = terminal(&events);
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].kind, EventKind::Error);
        assert!(terminal[0].data.contains("Install pod package"));
        assert!(terminal[0].data.contains("code 100"));
        // Output streamed before the failure stays visible.
        assert!(events.iter().any(|e| e.kind == EventKind::Stderr));
    }

    #[tokio::test]
    async fn test_allowed_failure_continues() {
        let runner = Arc::new(
            FakeRunner::new()
                .when("rm -f", Outcome::Exit(1))
                .when("apt-get update", Outcome::SpawnFailure),
        );
        let sequencer = sequencer(runner.clone());
        let (session, mut rx) = open(&sequencer);
        let steps = vec![
            StepDescriptor::new("Remove stale source", "rm")
                .args(["-f", "/etc/apt/sources.list.d/pod.list"])
                .allow_failure(),
            StepDescriptor::new("Refresh index", "apt-get")
                .arg("update")
                .allow_failure(),
            StepDescriptor::new("Install", "apt-get").arg("install"),
        ];

        sequencer.run(&session, &steps).await.unwrap();

        assert_eq!(runner.call_count(), 3);
        let events = rx.drain();
        let notices = events
            .iter()
            .filter(|e| e.data.contains("continuing despite error"))
            .count();
        assert_eq!(notices, 2);
        assert!(events
            .iter()
            .filter(|e| e.data.contains("continuing despite error"))
            .all(|e| e.kind == EventKind::Stdout));
        assert_eq!(events.last().unwrap().kind, EventKind::Complete);
    }

    #[tokio::test]
    async fn test_spawn_failure_of_required_step() {
        let runner = Arc::new(FakeRunner::new().when("missing", Outcome::SpawnFailure));
        let sequencer = sequencer(runner);
        let (session, mut rx) = open(&sequencer);

        let err = sequencer
            .run(&session, &[StepDescriptor::new("Run missing tool", "missing")])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to start missing"));
        assert_eq!(rx.drain().last().unwrap().kind, EventKind::Error);
    }

    #[tokio::test]
    async fn test_cancel_mid_step() {
        let runner = Arc::new(FakeRunner::new().when("sleep", Outcome::Hang));
        let sequencer = Arc::new(sequencer(runner.clone()));
        let (session, mut rx) = open(&sequencer);
        let steps = vec![
            StepDescriptor::new("Wait", "sleep").arg("600"),
            StepDescriptor::new("Never", "echo").arg("unreachable"),
        ];

        let task = {
            let sequencer = Arc::clone(&sequencer);
            let session = Arc::clone(&session);
            tokio::spawn(async move { sequencer.run(&session, &steps).await })
        };
        runner.hanging().await;

        assert_eq!(
            sequencer.registry().cancel(&session.id()),
            CancelOutcome::Cancelled
        );
        let err = task.await.unwrap().unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(runner.call_count(), 1);
        assert!(!sequencer.registry().contains(&session.id()));

        let events = rx.drain();
        let terminal = terminal(&events);
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].kind, EventKind::Cancelled);
        assert_eq!(events.last().unwrap().kind, EventKind::Cancelled);
    }

    #[tokio::test]
    async fn test_disconnected_session_runs_no_further_steps() {
        let runner = Arc::new(FakeRunner::new());
        let sequencer = sequencer(runner.clone());
        let (session, mut rx) = open(&sequencer);
        sequencer.registry().on_disconnect(&session.id());

        let err = sequencer
            .run(&session, &[StepDescriptor::new("Step", "true")])
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(runner.call_count(), 0);
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_run_detached_attempts_every_step() {
        let runner = Arc::new(FakeRunner::new().when("xandminerd", Outcome::Exit(5)));
        let sequencer = sequencer(runner.clone());
        let steps = vec![
            StepDescriptor::new("Restart daemon", "systemctl").args(["restart", "xandminerd"]),
            StepDescriptor::new("Restart agent", "systemctl").args(["restart", "xandminer"]),
        ];

        sequencer.run_detached(&steps).await;

        assert_eq!(runner.call_count(), 2);
        assert!(sequencer.registry().is_empty());
    }
}
