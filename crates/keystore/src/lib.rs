//! Durable credential storage for configured API accounts
//!
//! The setup flow treats persistence as a collaborator: it only needs a
//! `SecretStore` it can `set` credentials into. This crate defines that
//! trait plus `FileSecretStore`, a JSON-file implementation used by the
//! `api-setup` binary.

pub mod error;
pub mod file;
pub mod store;

pub use error::{Error, Result};
pub use file::FileSecretStore;
pub use store::{Credentials, SecretStore, StoreFuture};
