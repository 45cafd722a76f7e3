//! HTTP handlers for the setup listener
//!
//! Routes:
//! - GET  /          setup form with the CSRF token embedded
//! - POST /validate  test credentials without storing them
//! - POST /submit    validate, persist, and remember the result
//! - GET  /success   confirmation page rendered from server state
//! - POST /complete  hand the remembered result to the waiting caller
//!
//! Every POST checks the CSRF token before it touches the rate limiter, so
//! forged requests never burn a client's budget. Credential problems are
//! reported as HTTP 200 with `success:false`; only CSRF (403), rate limiting
//! (429), and undecodable bodies (400) use error statuses.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use keystore::{Credentials, SecretStore};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::config::SetupConfig;
use crate::csrf::{CSRF_HEADER, CsrfGuard};
use crate::flow::{CompletionSlot, FlowEvent, FlowPhase, PendingResult, SetupResult, ShutdownSignal};
use crate::metrics;
use crate::pages;
use crate::rate_limit::{RateLimitExceeded, RateLimiter};
use crate::validation::{CredentialValidator, CredentialsRequest, validate_request};

pub const VALIDATE_ENDPOINT: &str = "/validate";
pub const SUBMIT_ENDPOINT: &str = "/submit";

/// Request bodies are small JSON objects.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Concurrent requests accepted across all routes. One local user never
/// comes close.
const MAX_CONCURRENT_REQUESTS: usize = 32;

/// Shared state for one setup flow's handlers.
#[derive(Clone)]
pub struct SetupState {
    csrf: CsrfGuard,
    limiter: Arc<RateLimiter>,
    validator: Arc<dyn CredentialValidator>,
    store: Arc<dyn SecretStore>,
    pending: Arc<PendingResult>,
    completion: Arc<CompletionSlot>,
    shutdown: ShutdownSignal,
    phase: Arc<Mutex<FlowPhase>>,
}

impl SetupState {
    /// Build handler state plus the receiving end of the completion slot.
    pub fn new(
        csrf: CsrfGuard,
        limiter: Arc<RateLimiter>,
        validator: Arc<dyn CredentialValidator>,
        store: Arc<dyn SecretStore>,
    ) -> (Self, oneshot::Receiver<SetupResult>) {
        let (completion, rx) = CompletionSlot::new();
        let state = Self {
            csrf,
            limiter,
            validator,
            store,
            pending: Arc::new(PendingResult::default()),
            completion: Arc::new(completion),
            shutdown: ShutdownSignal::new(),
            phase: Arc::new(Mutex::new(FlowPhase::AwaitingInput)),
        };
        (state, rx)
    }

    pub fn csrf_token(&self) -> &str {
        self.csrf.token()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub async fn pending(&self) -> Option<SetupResult> {
        self.pending.get().await
    }

    pub async fn phase(&self) -> FlowPhase {
        *self.phase.lock().await
    }

    pub(crate) async fn advance(&self, event: FlowEvent) {
        let mut phase = self.phase.lock().await;
        let next = phase.advance(event);
        if next != *phase {
            debug!(from = ?*phase, to = ?next, "setup flow phase changed");
            *phase = next;
        }
    }

    /// CSRF first, then the rate limiter.
    async fn authorize(
        &self,
        headers: &HeaderMap,
        client: &str,
        endpoint: &'static str,
    ) -> Result<(), RequestError> {
        self.check_csrf(headers, endpoint)?;
        self.limiter.check(client, endpoint).await.map_err(|e| {
            warn!(client_addr = client, endpoint, "rate limit exceeded");
            metrics::record_rejection("rate_limit");
            RequestError::RateLimited(e)
        })
    }

    fn check_csrf(&self, headers: &HeaderMap, endpoint: &'static str) -> Result<(), RequestError> {
        let supplied = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        self.csrf.validate(supplied).map_err(|_| {
            warn!(endpoint, "rejected request with invalid CSRF token");
            metrics::record_rejection("csrf");
            RequestError::Forbidden
        })
    }
}

/// Build the setup router.
pub fn build_router(state: SetupState, config: &SetupConfig) -> Router {
    router_with_limit(state, config, MAX_CONCURRENT_REQUESTS)
}

/// `Router::layer` wraps every route separately, so the concurrency cap
/// uses the global layer to share one semaphore between them.
fn router_with_limit(state: SetupState, config: &SetupConfig, max_concurrent: usize) -> Router {
    Router::new()
        .route("/", get(setup_form))
        .route(VALIDATE_ENDPOINT, post(validate_credentials))
        .route(SUBMIT_ENDPOINT, post(submit_credentials))
        .route("/success", get(success_page))
        .route("/complete", post(complete))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::timeout::TimeoutLayer::new(config.request_timeout()))
        .layer(tower::limit::GlobalConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state)
}

/// Peer IP of the connection, used as the rate-limit client key.
///
/// Falls back to `unknown` when the router runs without connect info
/// (e.g. driven in-process).
pub struct ClientAddr(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientAddr(addr))
    }
}

/// Failures that short-circuit a mutating request with an error status.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid CSRF token")]
    Forbidden,

    #[error("too many attempts, try again in {} seconds", .0.retry_after.as_secs().max(1))]
    RateLimited(RateLimitExceeded),

    #[error("invalid request body: {0}")]
    Malformed(String),
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = match &self {
            RequestError::Forbidden => StatusCode::FORBIDDEN,
            RequestError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            RequestError::Malformed(_) => StatusCode::BAD_REQUEST,
        };
        let mut response = json_response(
            status,
            serde_json::json!({ "success": false, "error": self.to_string() }),
        );
        if let RequestError::RateLimited(e) = &self {
            let secs = e.retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body.to_string(),
    )
        .into_response()
}

fn failure(error: impl ToString) -> Response {
    json_response(
        StatusCode::OK,
        serde_json::json!({ "success": false, "error": error.to_string() }),
    )
}

fn html_response(body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CONTENT_SECURITY_POLICY, pages::CONTENT_SECURITY_POLICY),
            (header::X_FRAME_OPTIONS, "DENY"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (header::REFERRER_POLICY, "no-referrer"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
        .into_response()
}

fn decode(body: &Bytes) -> Result<CredentialsRequest, RequestError> {
    serde_json::from_slice(body).map_err(|e| {
        metrics::record_rejection("malformed");
        RequestError::Malformed(e.to_string())
    })
}

/// GET /: the setup form.
async fn setup_form(State(state): State<SetupState>) -> Response {
    html_response(pages::setup_page(state.csrf.token()))
}

/// POST /validate: test credentials, store nothing.
async fn validate_credentials(
    State(state): State<SetupState>,
    ClientAddr(client): ClientAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RequestError> {
    state.authorize(&headers, &client, VALIDATE_ENDPOINT).await?;
    let request = decode(&body)?;

    match validate_request(&request, state.validator.as_ref()).await {
        Ok(checked) => {
            info!(account_name = %checked.account_name, "credentials validated");
            metrics::record_request(VALIDATE_ENDPOINT, "success");
            state.advance(FlowEvent::Tested).await;
            Ok(json_response(
                StatusCode::OK,
                serde_json::json!({ "success": true, "message": "Credentials are valid" }),
            ))
        }
        Err(e) => {
            info!(error = %e, "credential test failed");
            metrics::record_request(VALIDATE_ENDPOINT, "invalid");
            Ok(failure(e))
        }
    }
}

/// POST /submit: validate, persist, and remember the result for /complete.
async fn submit_credentials(
    State(state): State<SetupState>,
    ClientAddr(client): ClientAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RequestError> {
    state.authorize(&headers, &client, SUBMIT_ENDPOINT).await?;
    let request = decode(&body)?;

    let checked = match validate_request(&request, state.validator.as_ref()).await {
        Ok(checked) => checked,
        Err(e) => {
            info!(error = %e, "credential submission rejected");
            metrics::record_request(SUBMIT_ENDPOINT, "invalid");
            return Ok(failure(e));
        }
    };

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let credentials = Credentials {
        client_id: checked.client_id.clone(),
        api_key: checked.api_key.clone(),
        account_id: checked.account_id.clone(),
        created_at,
    };

    if let Err(e) = state.store.set(&checked.account_name, credentials).await {
        warn!(account_name = %checked.account_name, error = %e, "failed to store credentials");
        metrics::record_request(SUBMIT_ENDPOINT, "store_failed");
        return Ok(failure(format!("failed to save credentials: {e}")));
    }

    state
        .pending
        .set(SetupResult {
            account_name: checked.account_name.clone(),
            client_id: checked.client_id,
            account_id: checked.account_id,
            error: None,
        })
        .await;
    state.advance(FlowEvent::Submitted).await;

    info!(account_name = %checked.account_name, "credentials stored");
    metrics::record_request(SUBMIT_ENDPOINT, "success");

    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({ "success": true, "account_name": checked.account_name }),
    ))
}

/// GET /success: rendered purely from the pending result. Query
/// parameters are never read, so a crafted link cannot fake a success page.
async fn success_page(State(state): State<SetupState>) -> Response {
    let pending = state.pending.get().await;
    if pending.is_some() {
        state.advance(FlowEvent::SuccessViewed).await;
    }
    html_response(pages::success_page(
        pending.as_ref().map(|r| r.account_name.as_str()),
        state.csrf.token(),
    ))
}

/// POST /complete: deliver the pending result (if any) and ask the
/// listener to shut down. Safe to call more than once.
async fn complete(
    State(state): State<SetupState>,
    headers: HeaderMap,
) -> Result<Response, RequestError> {
    state.check_csrf(&headers, "/complete")?;

    match state.pending.get().await {
        Some(result) => {
            let account_name = result.account_name.clone();
            if state.completion.deliver(result).await {
                info!(account_name, "setup completed");
            }
            state.advance(FlowEvent::Completed).await;
        }
        None => {
            info!("completion requested without stored credentials");
            state.advance(FlowEvent::Cancelled).await;
        }
    }

    state.shutdown.fire();

    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({ "success": true }),
    ))
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}
