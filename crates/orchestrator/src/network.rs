//! Network throughput measurement through an external speed-test tool.

use std::sync::Arc;

use events::{event_channel, EventKind};
use node_core::SessionId;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::NetworkTestError;
use crate::process::{CommandSpec, ProcessHandle, ProcessRunner};

/// Runs the configured speed-test command and parses its JSON report.
///
/// The run is private: output is collected, never streamed to a session.
pub struct NetworkTester {
    runner: Arc<dyn ProcessRunner>,
    command: CommandSpec,
}

impl NetworkTester {
    pub fn new(runner: Arc<dyn ProcessRunner>, command: CommandSpec) -> Self {
        Self { runner, command }
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub async fn run(&self) -> Result<Value, NetworkTestError> {
        let handle = ProcessHandle::new("network speed test");
        let (sink, mut output) = event_channel(SessionId::new());

        info!(program = %self.command.program, "Running network speed test");
        let result = self.runner.run(&self.command, &handle, &sink).await;
        drop(sink);

        let mut stdout = String::new();
        let mut stderr = Vec::new();
        for event in output.drain() {
            match event.kind {
                EventKind::Stdout => {
                    stdout.push_str(&event.data);
                    stdout.push('\n');
                }
                EventKind::Stderr => stderr.push(event.data),
                _ => {}
            }
        }

        result?;
        if !stderr.is_empty() {
            return Err(NetworkTestError::Reported(stderr.join("\n")));
        }

        let report = serde_json::from_str(&stdout).map_err(NetworkTestError::InvalidOutput)?;
        debug!("Network speed test finished");
        Ok(report)
    }
}
