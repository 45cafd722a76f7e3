//! Opening the user's browser at the setup page

use std::sync::Arc;

use tracing::{info, warn};

/// Browser launch failed; the flow continues and the user opens the URL
/// by hand.
#[derive(Debug, thiserror::Error)]
#[error("failed to open browser: {0}")]
pub struct BrowserError(#[from] pub std::io::Error);

/// Opens a URL in the user's browser. Called from a blocking thread.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), BrowserError>;
}

/// Launches the platform's default browser via the `open` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), BrowserError> {
        open::that(url)?;
        Ok(())
    }
}

/// Fire-and-forget browser launch on the blocking pool.
///
/// Failure is logged, never returned: the listener keeps waiting.
pub fn spawn_open(launcher: Arc<dyn BrowserLauncher>, url: String) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || match launcher.open(&url) {
        Ok(()) => info!(url, "opened browser"),
        Err(e) => warn!(url, error = %e, "could not open browser, open the URL manually"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording(Mutex<Vec<String>>);

    impl BrowserLauncher for Recording {
        fn open(&self, url: &str) -> Result<(), BrowserError> {
            self.0.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    struct Failing;

    impl BrowserLauncher for Failing {
        fn open(&self, _url: &str) -> Result<(), BrowserError> {
            Err(BrowserError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no browser",
            )))
        }
    }

    #[tokio::test]
    async fn spawn_open_passes_url() {
        let launcher = Arc::new(Recording(Mutex::new(vec![])));
        spawn_open(launcher.clone(), "http://127.0.0.1:4242".into())
            .await
            .unwrap();
        assert_eq!(
            *launcher.0.lock().unwrap(),
            vec!["http://127.0.0.1:4242".to_string()]
        );
    }

    #[tokio::test]
    async fn spawn_open_swallows_failure() {
        let result = spawn_open(Arc::new(Failing), "http://127.0.0.1:4242".into()).await;
        assert!(result.is_ok());
    }
}
