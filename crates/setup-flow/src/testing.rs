//! In-memory collaborators for handler and lifecycle tests

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use keystore::{Credentials, SecretStore, StoreFuture};
use tokio::sync::Mutex;

use crate::validation::{CheckedCredentials, CredentialValidator, ValidatorError};

pub struct StubValidator {
    rejection: Option<String>,
}

impl StubValidator {
    pub fn accept() -> Self {
        Self { rejection: None }
    }

    pub fn reject(reason: &str) -> Self {
        Self {
            rejection: Some(reason.to_string()),
        }
    }
}

impl CredentialValidator for StubValidator {
    fn validate<'a>(
        &'a self,
        _credentials: &'a CheckedCredentials,
    ) -> Pin<Box<dyn Future<Output = Result<(), ValidatorError>> + Send + 'a>> {
        Box::pin(async move {
            match &self.rejection {
                Some(reason) => Err(ValidatorError(reason.clone())),
                None => Ok(()),
            }
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Credentials>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            entries: Mutex::default(),
            fail_writes: true,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn get<'a>(&'a self, name: &'a str) -> StoreFuture<'a, keystore::Result<Option<Credentials>>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(name).cloned()) })
    }

    fn set<'a>(
        &'a self,
        name: &'a str,
        credentials: Credentials,
    ) -> StoreFuture<'a, keystore::Result<()>> {
        Box::pin(async move {
            if self.fail_writes {
                return Err(keystore::Error::Io("disk full".into()));
            }
            self.entries
                .lock()
                .await
                .insert(name.to_string(), credentials);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, keystore::Result<Option<Credentials>>> {
        Box::pin(async move { Ok(self.entries.lock().await.remove(name)) })
    }

    fn list(&self) -> StoreFuture<'_, keystore::Result<Vec<(String, Credentials)>>> {
        Box::pin(async move {
            Ok(self
                .entries
                .lock()
                .await
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })
    }

    fn keys(&self) -> StoreFuture<'_, keystore::Result<Vec<String>>> {
        Box::pin(async move { Ok(self.entries.lock().await.keys().cloned().collect()) })
    }
}
