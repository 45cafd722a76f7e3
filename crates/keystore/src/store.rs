//! The `SecretStore` collaborator contract

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Credentials for one named account.
///
/// The account name is the store key and is not repeated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub api_key: Secret<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Unix timestamp (seconds) when the credentials were stored
    #[serde(default)]
    pub created_at: u64,
}

/// Boxed future returned by `SecretStore` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable key-value store for account credentials.
///
/// Uses `Pin<Box<dyn Future>>` return types so implementations can be
/// shared as `Arc<dyn SecretStore>`.
pub trait SecretStore: Send + Sync {
    /// Fetch the credentials stored under `name`.
    fn get<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Result<Option<Credentials>>>;

    /// Add or replace the credentials stored under `name`.
    fn set<'a>(&'a self, name: &'a str, credentials: Credentials) -> StoreFuture<'a, Result<()>>;

    /// Remove `name`, returning what was stored if it existed.
    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Result<Option<Credentials>>>;

    /// All stored accounts, sorted by name.
    fn list(&self) -> StoreFuture<'_, Result<Vec<(String, Credentials)>>>;

    /// All stored account names, sorted.
    fn keys(&self) -> StoreFuture<'_, Result<Vec<String>>>;
}
