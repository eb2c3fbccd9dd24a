mod dedication;
mod health;
mod host;
mod keypair;
mod sessions;
mod ws;

pub use dedication::*;
pub use health::*;
pub use host::*;
pub use keypair::*;
pub use sessions::*;
pub use ws::*;
