//! Setup state coordination
//!
//! Holds everything one setup flow shares between its HTTP handlers and the
//! blocked `start()` caller: the pending result written by `/submit`, the
//! one-shot completion slot drained by `start()`, the idempotent shutdown
//! signal fired by `/complete`, and the diagnostic flow phase.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a finished setup flow, handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupResult {
    pub account_name: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Conceptual position in the browser flow.
///
/// Tracked for logging only; request handling never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    AwaitingInput,
    Testing,
    Submitted,
    AwaitingCompletion,
    Done,
    Cancelled,
}

/// Things that move the flow between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    /// `/validate` accepted a test call
    Tested,
    /// `/submit` validated and persisted credentials
    Submitted,
    /// `/success` rendered a page for a stored result
    SuccessViewed,
    /// `/complete` delivered the pending result
    Completed,
    /// `/complete` fired without a pending result, or the caller cancelled
    Cancelled,
}

impl FlowPhase {
    /// Pure transition function. Events that make no sense from the current
    /// phase leave it unchanged; terminal phases absorb everything.
    pub fn advance(self, event: FlowEvent) -> FlowPhase {
        use FlowEvent as E;
        use FlowPhase as P;

        match (self, event) {
            (P::Done | P::Cancelled, _) => self,
            (_, E::Cancelled) => P::Cancelled,
            (P::AwaitingInput | P::Testing, E::Tested) => P::Testing,
            (P::Submitted | P::AwaitingCompletion, E::Tested) => self,
            (_, E::Submitted) => P::Submitted,
            (P::Submitted, E::SuccessViewed) => P::AwaitingCompletion,
            (_, E::SuccessViewed) => self,
            (P::Submitted | P::AwaitingCompletion, E::Completed) => P::Done,
            (_, E::Completed) => self,
        }
    }
}

/// Mutex-guarded result written by `/submit` and read by `/success` and
/// `/complete`. Once set it is never cleared; a later submit replaces it.
#[derive(Debug, Default)]
pub struct PendingResult {
    inner: Mutex<Option<SetupResult>>,
}

impl PendingResult {
    pub async fn set(&self, result: SetupResult) {
        let mut slot = self.inner.lock().await;
        if slot.is_some() {
            debug!(account_name = %result.account_name, "replacing pending setup result");
        }
        *slot = Some(result);
    }

    pub async fn get(&self) -> Option<SetupResult> {
        self.inner.lock().await.clone()
    }
}

/// Single-delivery handoff from the `/complete` handler to `start()`.
///
/// The sender is taken on first delivery; later deliveries are refused
/// explicitly instead of relying on a channel that errors on reuse.
#[derive(Debug)]
pub struct CompletionSlot {
    sender: Mutex<Option<oneshot::Sender<SetupResult>>>,
}

impl CompletionSlot {
    pub fn new() -> (Self, oneshot::Receiver<SetupResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Deliver `result` to the waiting caller. Returns false if a result was
    /// already delivered or the caller has stopped waiting.
    pub async fn deliver(&self, result: SetupResult) -> bool {
        let Some(tx) = self.sender.lock().await.take() else {
            warn!("setup result already delivered, ignoring duplicate completion");
            return false;
        };
        tx.send(result).is_ok()
    }
}

/// Fire-once shutdown request raised when the browser declares the flow
/// finished. Firing again is a logged no-op.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    fired: std::sync::Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only for the call that actually fired the signal.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("shutdown already signalled");
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves once `fire` has been called.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
