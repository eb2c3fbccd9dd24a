//! Run events and the per-session streaming channel.
//!
//! The orchestrator produces [`RunEvent`]s through an [`EventSender`]; the
//! transport layer consumes them from the matching [`EventReceiver`]. Neither
//! side knows about the other.

mod channel;
mod types;

pub use channel::{event_channel, EventReceiver, EventSender};
pub use types::*;
