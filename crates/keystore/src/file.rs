//! JSON file backed `SecretStore`
//!
//! Keeps a map of account name to credentials in one JSON file. Every
//! mutation rewrites the file atomically (temp file + rename) with 0600
//! permissions, and a tokio Mutex serializes writers so concurrent `set`
//! calls cannot interleave.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::{Credentials, SecretStore, StoreFuture};

/// Credential file manager.
pub struct FileSecretStore {
    path: PathBuf,
    state: Mutex<BTreeMap<String, Credentials>>,
}

impl FileSecretStore {
    /// Load credentials from the given file path.
    ///
    /// A missing file is a cold start: the store begins empty and the file
    /// is created on the first write.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let accounts: BTreeMap<String, Credentials> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), accounts = accounts.len(), "loaded credentials");
            accounts
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn get_inner(&self, name: &str) -> Option<Credentials> {
        let state = self.state.lock().await;
        state.get(name).cloned()
    }

    /// The in-memory map only changes once the file write succeeded.
    async fn set_inner(&self, name: &str, credentials: Credentials) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.insert(name.to_string(), credentials);
        write_atomic(&self.path, &next).await?;
        *state = next;
        debug!(account_name = name, "stored credentials");
        Ok(())
    }

    async fn delete_inner(&self, name: &str) -> Result<Option<Credentials>> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let removed = next.remove(name);
        if removed.is_some() {
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(account_name = name, "removed credentials");
        }
        Ok(removed)
    }

    async fn list_inner(&self) -> Vec<(String, Credentials)> {
        let state = self.state.lock().await;
        state
            .iter()
            .map(|(name, creds)| (name.clone(), creds.clone()))
            .collect()
    }

    async fn keys_inner(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.keys().cloned().collect()
    }
}

impl SecretStore for FileSecretStore {
    fn get<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Result<Option<Credentials>>> {
        Box::pin(async move { Ok(self.get_inner(name).await) })
    }

    fn set<'a>(&'a self, name: &'a str, credentials: Credentials) -> StoreFuture<'a, Result<()>> {
        Box::pin(self.set_inner(name, credentials))
    }

    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Result<Option<Credentials>>> {
        Box::pin(self.delete_inner(name))
    }

    fn list(&self) -> StoreFuture<'_, Result<Vec<(String, Credentials)>>> {
        Box::pin(async move { Ok(self.list_inner().await) })
    }

    fn keys(&self) -> StoreFuture<'_, Result<Vec<String>>> {
        Box::pin(async move { Ok(self.keys_inner().await) })
    }
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target, so a crash mid-write leaves the previous file intact.
async fn write_atomic(path: &Path, data: &BTreeMap<String, Credentials>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(&tmp_path)
        .await
        .map_err(|e| Error::Io(format!("creating temp credential file: {e}")))?;
    file.write_all(json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Io(format!("syncing temp credential file: {e}")))?;
    drop(file);

    // A stale temp file left by a crash keeps its old mode
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use std::sync::Arc;

    fn test_credentials(suffix: &str) -> Credentials {
        Credentials {
            client_id: format!("client-{suffix}"),
            api_key: Secret::new(format!("key-{suffix}")),
            account_id: None,
            created_at: 1_735_500_000,
        }
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileSecretStore::load(path.clone()).await.unwrap();
        let mut creds = test_credentials("1");
        creds.account_id = Some("acct-42".into());
        store.set("acme", creds).await.unwrap();

        let reloaded = FileSecretStore::load(path).await.unwrap();
        let creds = reloaded.get("acme").await.unwrap().unwrap();
        assert_eq!(creds.client_id, "client-1");
        assert_eq!(creds.api_key.expose(), "key-1");
        assert_eq!(creds.account_id.as_deref(), Some("acct-42"));
    }

    #[tokio::test]
    async fn cold_start_is_empty_and_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileSecretStore::load(path.clone()).await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
        assert!(!path.exists(), "file should only appear on first write");

        store.set("acme", test_credentials("1")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn set_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let store = FileSecretStore::load(path.clone()).await.unwrap();
        store.set("acme", test_credentials("1")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn set_replaces_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::load(dir.path().join("credentials.json"))
            .await
            .unwrap();

        store.set("acme", test_credentials("old")).await.unwrap();
        store.set("acme", test_credentials("new")).await.unwrap();

        let creds = store.get("acme").await.unwrap().unwrap();
        assert_eq!(creds.client_id, "client-new");
        assert_eq!(store.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_returns_removed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::load(dir.path().join("credentials.json"))
            .await
            .unwrap();
        store.set("acme", test_credentials("1")).await.unwrap();
        store.set("globex", test_credentials("2")).await.unwrap();

        let removed = store.delete("acme").await.unwrap();
        assert_eq!(removed.unwrap().client_id, "client-1");
        assert_eq!(store.keys().await.unwrap(), vec!["globex"]);

        let removed_again = store.delete("acme").await.unwrap();
        assert!(removed_again.is_none());
    }

    #[tokio::test]
    async fn list_and_keys_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::load(dir.path().join("credentials.json"))
            .await
            .unwrap();
        store.set("zeta", test_credentials("z")).await.unwrap();
        store.set("alpha", test_credentials("a")).await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["alpha", "zeta"]);
        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].0, "alpha");
        assert_eq!(listed[0].1.client_id, "client-a");
        assert_eq!(listed[1].0, "zeta");
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let result = FileSecretStore::load(path).await;
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileSecretStore::load(path.clone()).await.unwrap();
        store.set("acme", test_credentials("1")).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = Arc::new(FileSecretStore::load(path.clone()).await.unwrap());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set(&format!("acct-{i}"), test_credentials(&i.to_string()))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.keys().await.unwrap().len(), 10);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: BTreeMap<String, Credentials> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 10);
    }

    #[tokio::test]
    async fn usable_as_trait_object() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SecretStore> = Arc::new(
            FileSecretStore::load(dir.path().join("credentials.json"))
                .await
                .unwrap(),
        );
        store.set("acme", test_credentials("1")).await.unwrap();
        assert!(store.get("acme").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_set_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        // Parent "directory" is a regular file, so every write fails
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"not a directory").await.unwrap();

        let store = FileSecretStore::load(blocker.join("credentials.json"))
            .await
            .unwrap();
        let result = store.set("acme", test_credentials("1")).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(store.get("acme").await.unwrap().is_none());
        assert!(store.keys().await.unwrap().is_empty());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        let store = FileSecretStore::load(nested.join("credentials.json"))
            .await
            .unwrap();
        store.set("acme", test_credentials("1")).await.unwrap();

        tokio::fs::remove_dir_all(&nested).await.unwrap();
        tokio::fs::write(&nested, b"not a directory").await.unwrap();

        assert!(store.delete("acme").await.is_err());
        assert!(store.get("acme").await.unwrap().is_some());
        assert_eq!(store.keys().await.unwrap(), vec!["acme".to_string()]);
    }

    #[tokio::test]
    async fn stale_temp_file_is_tightened_to_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let stale = dir
            .path()
            .join(format!(".credentials.tmp.{}", std::process::id()));
        std::fs::write(&stale, b"{}").unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileSecretStore::load(path.clone()).await.unwrap();
        store.set("acme", test_credentials("1")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
        assert!(!stale.exists());
    }
}
