//! Ephemeral setup listener lifecycle
//!
//! `SetupServer::start` binds an OS-assigned loopback port, serves the setup
//! routes, opens the browser, and then blocks on whichever comes first:
//!
//! 1. the completion slot yields a result (success),
//! 2. the caller's cancellation token fires (`Error::Cancelled`),
//! 3. the browser declares the flow finished without a result
//!    (`Error::FlowCancelled`).
//!
//! Every exit path stops the rate-limit sweep and drains the listener.

use std::net::SocketAddr;
use std::sync::Arc;

use keystore::SecretStore;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::{self, BrowserLauncher};
use crate::config::SetupConfig;
use crate::csrf::CsrfGuard;
use crate::error::{Error, Result};
use crate::flow::{FlowEvent, SetupResult};
use crate::handlers::{SetupState, build_router};
use crate::rate_limit::{self, RateLimiter};
use crate::validation::CredentialValidator;

/// One browser setup flow. Consumed by `start`.
pub struct SetupServer {
    config: SetupConfig,
    state: SetupState,
    completion_rx: oneshot::Receiver<SetupResult>,
    launcher: Arc<dyn BrowserLauncher>,
}

impl SetupServer {
    /// Create the flow's CSRF token, rate limiter, and handler state.
    pub fn new(
        config: SetupConfig,
        validator: Arc<dyn CredentialValidator>,
        store: Arc<dyn SecretStore>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let (state, completion_rx) =
            SetupState::new(CsrfGuard::generate(), limiter, validator, store);
        Self {
            config,
            state,
            completion_rx,
            launcher,
        }
    }

    pub fn csrf_token(&self) -> &str {
        self.state.csrf_token()
    }

    /// Run the flow until it completes, is cancelled by `cancel`, or is
    /// abandoned from the browser.
    pub async fn start(self, cancel: CancellationToken) -> Result<SetupResult> {
        let (outcome, _sweep) = self.run(cancel).await;
        outcome
    }

    /// The whole flow. Also returns the sweep task, already stopped, when
    /// the listener got as far as starting it.
    async fn run(
        self,
        cancel: CancellationToken,
    ) -> (Result<SetupResult>, Option<JoinHandle<()>>) {
        let flow_id = format!("setup_{}", uuid::Uuid::new_v4().as_simple());

        let bound = TcpListener::bind(SocketAddr::new(self.config.bind_addr, 0))
            .await
            .and_then(|listener| {
                let addr = listener.local_addr()?;
                Ok((listener, addr))
            });
        let (listener, addr) = match bound {
            Ok(bound) => bound,
            Err(e) => return (Err(Error::Bind(e)), None),
        };
        let base_url = format!("http://{addr}");
        info!(flow_id, %addr, "setup listener ready");

        let mut sweep = rate_limit::spawn_cleanup_task(
            self.state.limiter().clone(),
            self.config.rate_limit.cleanup_interval(),
        );

        let app = build_router(self.state.clone(), &self.config);
        let stop = CancellationToken::new();
        let server_stop = stop.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { server_stop.cancelled().await })
            .await
        });

        browser::spawn_open(self.launcher.clone(), base_url.clone());
        info!(flow_id, url = %base_url, "waiting for browser setup to finish");

        let mut completion_rx = self.completion_rx;
        let shutdown = self.state.shutdown().clone();
        let mut server_finished = false;

        let outcome = tokio::select! {
            biased;
            delivered = &mut completion_rx => delivered.map_err(|_| Error::FlowCancelled),
            _ = cancel.cancelled() => Err(Error::Cancelled),
            // /complete delivers before it signals, so a result sent in the
            // same instant is still waiting in the slot
            _ = shutdown.wait() => completion_rx.try_recv().map_err(|_| Error::FlowCancelled),
            joined = &mut server => {
                server_finished = true;
                Err(match joined {
                    Ok(Ok(())) => Error::Server("listener stopped unexpectedly".into()),
                    Ok(Err(e)) => Error::Server(e.to_string()),
                    Err(e) => Error::Server(format!("listener task panicked: {e}")),
                })
            }
        };

        match &outcome {
            Ok(result) => info!(flow_id, account_name = %result.account_name, "setup finished"),
            Err(e) => {
                self.state.advance(FlowEvent::Cancelled).await;
                warn!(flow_id, error = %e, "setup ended without credentials");
            }
        }

        // Teardown runs on every exit path
        stop.cancel();
        sweep.abort();
        let _ = (&mut sweep).await;
        if !server_finished {
            let drain = self.config.drain_timeout();
            let abort = server.abort_handle();
            match tokio::time::timeout(drain, server).await {
                Ok(Ok(Ok(()))) => info!(flow_id, "setup listener stopped"),
                Ok(Ok(Err(e))) => error!(flow_id, error = %e, "setup listener error during shutdown"),
                Ok(Err(e)) => error!(flow_id, error = %e, "setup listener task panicked"),
                Err(_) => {
                    warn!(
                        flow_id,
                        drain_timeout_secs = drain.as_secs(),
                        "drain timeout exceeded, forcing setup listener down"
                    );
                    abort.abort();
                }
            }
        }

        (outcome, Some(sweep))
    }
}
