//! Spawning host programs and streaming their output line by line.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use events::EventSender;
use node_core::StepDescriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::debug;
#[cfg(not(unix))]
use tracing::warn;

/// How long output is still collected after the child exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited with code {code}")]
    ExitCode {
        program: String,
        code: i32,
        output: String,
    },

    #[error("{program} was interrupted")]
    Interrupted { program: String },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExitCode { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

/// Privilege elevation wrapper prepended to elevated steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Elevation {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for Elevation {
    fn default() -> Self {
        Self {
            program: "sudo".to_string(),
            args: Vec::new(),
        }
    }
}

impl Elevation {
    /// No wrapper; elevated steps run as the agent's own user.
    pub fn none() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.program.is_empty()
    }
}

/// Fully resolved argv for one spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub stdin_input: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            stdin_input: None,
        }
    }

    pub fn from_step(step: &StepDescriptor, elevation: &Elevation) -> Self {
        let mut spec = if step.is_elevated() && elevation.is_enabled() {
            let mut args = elevation.args.clone();
            args.push(step.program().to_string());
            args.extend(step.arguments().iter().cloned());
            Self {
                program: elevation.program.clone(),
                args,
                working_dir: None,
                stdin_input: None,
            }
        } else {
            Self {
                program: step.program().to_string(),
                args: step.arguments().to_vec(),
                working_dir: None,
                stdin_input: None,
            }
        };
        spec.working_dir = step.working_dir().map(PathBuf::from);
        spec.stdin_input = step.stdin_input().map(str::to_string);
        spec
    }
}

#[derive(Debug, Default)]
struct HandleState {
    pid: Option<u32>,
    interrupted: bool,
    finished: bool,
}

#[derive(Debug)]
struct HandleInner {
    label: String,
    state: Mutex<HandleState>,
    notify: Notify,
}

/// Shared control handle over one spawned process.
///
/// The runner attaches the pid once the child exists; anyone holding a clone
/// may interrupt it, before or after the spawn.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    inner: Arc<HandleInner>,
}

impl ProcessHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                label: label.into(),
                state: Mutex::new(HandleState::default()),
                notify: Notify::new(),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock().pid
    }

    pub fn attach_pid(&self, pid: u32) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        state.pid = Some(pid);
        if state.interrupted {
            send_interrupt(pid);
        }
    }

    /// Ask the process to stop. Returns false if it already finished.
    pub fn interrupt(&self) -> bool {
        let mut state = self.lock();
        if state.finished {
            return false;
        }
        if !state.interrupted {
            state.interrupted = true;
            if let Some(pid) = state.pid {
                send_interrupt(pid);
            }
            self.inner.notify.notify_one();
        }
        true
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock().interrupted
    }

    /// Resolves once [`interrupt`](Self::interrupt) has been called.
    pub async fn interrupted(&self) {
        loop {
            if self.is_interrupted() {
                return;
            }
            self.inner.notify.notified().await;
        }
    }

    pub fn mark_finished(&self) {
        let mut state = self.lock();
        state.finished = true;
        state.pid = None;
    }

    pub fn is_live(&self) -> bool {
        !self.lock().finished
    }

    pub fn same_as(&self, other: &ProcessHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HandleState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(unix)]
fn send_interrupt(pid: u32) {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc != 0 {
        debug!(pid, error = %io::Error::last_os_error(), "Interrupt delivery failed");
    }
}

#[cfg(not(unix))]
fn send_interrupt(pid: u32) {
    warn!(pid, "Interrupts are not supported on this platform");
}

/// Runs one command to completion, streaming each output line to `sink`.
///
/// Returns the combined captured output on a zero exit status.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &CommandSpec,
        handle: &ProcessHandle,
        sink: &EventSender,
    ) -> Result<String, ProcessError>;
}

/// Runner that spawns real host processes.
#[derive(Debug, Clone, Default)]
pub struct HostProcessRunner;

impl HostProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for HostProcessRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        handle: &ProcessHandle,
        sink: &EventSender,
    ) -> Result<String, ProcessError> {
        let program = command.program.as_str();
        if handle.is_interrupted() {
            return Err(ProcessError::Interrupted {
                program: program.to_string(),
            });
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if command.stdin_input.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| ProcessError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(pid) = child.id() {
            debug!(pid, program = %program, "Process spawned");
            handle.attach_pid(pid);
        }

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let captured = Mutex::new(String::new());

        let feed = async {
            if let (Some(mut stdin), Some(input)) = (stdin, command.stdin_input.as_deref()) {
                // The child may exit without reading its input.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(program = %program, error = %e, "Failed to write stdin");
                }
            }
        };
        let out = pump_lines(stdout, &captured, |line| sink.stdout(line));
        let err = pump_lines(stderr, &captured, |line| sink.stderr(line));

        // Output pipes may outlive the child when it leaves background jobs
        // holding them, so the child's exit is what ends the step.
        let mut io = std::pin::pin!(async {
            tokio::join!(feed, out, err);
        });
        let mut exited = std::pin::pin!(child.wait());
        let mut io_done = false;
        // Cancellation is cooperative: an interrupted child is still awaited.
        let status = loop {
            tokio::select! {
                _ = &mut io, if !io_done => io_done = true,
                status = &mut exited => break status,
            }
        };
        handle.mark_finished();

        if !io_done && tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut io).await.is_err() {
            debug!(
                program = %program,
                "Output still open after exit, dropping the rest"
            );
        }

        let status = status.map_err(|source| ProcessError::Io {
            program: program.to_string(),
            source,
        })?;
        let output = std::mem::take(
            &mut *captured
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        if handle.is_interrupted() {
            return Err(ProcessError::Interrupted {
                program: program.to_string(),
            });
        }
        if status.success() {
            Ok(output)
        } else {
            Err(ProcessError::ExitCode {
                program: program.to_string(),
                code: status.code().unwrap_or(-1),
                output,
            })
        }
    }
}

async fn pump_lines<R, F>(reader: Option<R>, captured: &Mutex<String>, mut emit: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String) -> bool,
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                {
                    let mut captured = captured
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    captured.push_str(&line);
                    captured.push('\n');
                }
                emit(line);
            }
            Err(e) => {
                debug!(error = %e, "Output stream closed with error");
                break;
            }
        }
    }
}
