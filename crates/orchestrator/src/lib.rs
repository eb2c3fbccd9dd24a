//! Orchestration of privileged host operations.
//!
//! - [`process`] spawns external programs and streams their output
//! - [`registry`] tracks which session owns which live process
//! - [`sequencer`] runs step lists with per-step failure tolerance
//! - [`upgrade`] drives the upgrade workflow state machine
//! - [`dedication`] reserves disk space with compensating rollback
//! - [`network`] measures throughput with an external speed-test tool
//! - [`keypair`] keeps the node's ed25519 identity on disk

pub mod dedication;
pub mod error;
pub mod keypair;
pub mod network;
pub mod process;
pub mod registry;
pub mod resources;
pub mod sequencer;
pub mod service;
pub mod state_machine;
pub mod upgrade;

#[cfg(test)]
mod test_support;

pub use dedication::{Dedication, DedicationFs, Dedicator, HostFs};
pub use error::{DedicationError, KeypairError, NetworkTestError, OrchestratorError, Result};
pub use keypair::{KeypairStore, KEYPAIR_FILE_NAME};
pub use network::NetworkTester;
pub use process::{
    CommandSpec, Elevation, HostProcessRunner, ProcessError, ProcessHandle, ProcessRunner,
};
pub use registry::{
    CancelOutcome, Session, SessionRegistry, SessionSummary, CANCELLED_MESSAGE, NO_ACTIVE_COMMAND,
};
pub use sequencer::CommandSequencer;
pub use service::Orchestrator;
pub use state_machine::UpgradeStateMachine;
pub use upgrade::{UpgradeOutcome, UpgradeWorkflow};
