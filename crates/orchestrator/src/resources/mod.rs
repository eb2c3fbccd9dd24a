//! RAII guards for session cleanup.
//!
//! - [`SessionGuard`] - closes a run's stream and releases its process if the
//!   driving task ends without reporting an outcome

mod session_guard;

pub use session_guard::SessionGuard;
