//! Common types shared by the setup workspace

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
