//! Scripted process runner for exercising sequencing without a host.

use std::sync::Mutex;

use async_trait::async_trait;
use events::EventSender;
use tokio::sync::Notify;

use crate::process::{CommandSpec, ProcessError, ProcessHandle, ProcessRunner};

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Succeed(Vec<&'static str>),
    Exit(i32),
    SpawnFailure,
    /// Blocks until the handle is interrupted.
    Hang,
}

/// Matches commands by substring of their joined argv; unmatched commands
/// succeed silently.
#[derive(Default)]
pub(crate) struct FakeRunner {
    script: Mutex<Vec<(String, Outcome)>>,
    calls: Mutex<Vec<CommandSpec>>,
    started: Notify,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn when(self, pattern: &str, outcome: Outcome) -> Self {
        self.script
            .lock()
            .unwrap()
            .push((pattern.to_string(), outcome));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(command_line)
            .collect()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Wait until a hanging command has started.
    pub(crate) async fn hanging(&self) {
        self.started.notified().await;
    }

    fn outcome_for(&self, line: &str) -> Outcome {
        self.script
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or(Outcome::Succeed(Vec::new()))
    }
}

fn command_line(spec: &CommandSpec) -> String {
    std::iter::once(spec.program.as_str())
        .chain(spec.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        handle: &ProcessHandle,
        sink: &EventSender,
    ) -> Result<String, ProcessError> {
        let line = command_line(command);
        self.calls.lock().unwrap().push(command.clone());
        let program = command.program.clone();

        let result = match self.outcome_for(&line) {
            Outcome::Succeed(lines) => {
                for output in &lines {
                    sink.stdout(*output);
                }
                Ok(lines.join("\n"))
            }
            Outcome::Exit(code) => {
                sink.stderr(format!("{program}: failed"));
                Err(ProcessError::ExitCode {
                    program,
                    code,
                    output: String::new(),
                })
            }
            Outcome::SpawnFailure => Err(ProcessError::Spawn {
                program,
                reason: "No such file or directory".to_string(),
            }),
            Outcome::Hang => {
                self.started.notify_one();
                handle.interrupted().await;
                Err(ProcessError::Interrupted { program })
            }
        };
        handle.mark_finished();
        result
    }
}
