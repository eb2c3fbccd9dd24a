//! WebSocket transport for run sessions.
//!
//! One socket drives at most one session: the client starts an upgrade,
//! receives its events as they are produced, and may cancel it. The socket is
//! closed after the session's terminal event.

mod handler;
mod messages;

pub use handler::{ws_handler, WsState};
pub use messages::{ClientMessage, ServerMessage};
