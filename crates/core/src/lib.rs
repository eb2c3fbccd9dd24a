//! Domain types shared by the pNode agent crates.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::CoreError;
