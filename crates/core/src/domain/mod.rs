mod dedication;
mod manifest;
mod session;
mod step;
mod upgrade;

pub use dedication::*;
pub use manifest::*;
pub use session::*;
pub use step::*;
pub use upgrade::*;
