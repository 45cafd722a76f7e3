//! Live credential check against the remote API

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use setup_flow::{CheckedCredentials, CredentialValidator, ValidatorError};
use tracing::debug;

/// Longest slice of an upstream error body echoed back to the browser
const MAX_ERROR_BODY: usize = 200;

/// Sends a bearer-authenticated GET to the configured verify endpoint.
///
/// Any 2xx means the credentials work. 401 and 403 are reported as invalid
/// credentials, everything else carries the upstream status.
pub struct HttpCredentialValidator {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpCredentialValidator {
    pub fn new(client: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }
}

/// Credential fields travel as headers, so they must be visible ASCII.
fn header_value(value: &str, field: &str) -> Result<HeaderValue, ValidatorError> {
    HeaderValue::from_str(value).map_err(|_| {
        ValidatorError(format!(
            "{field} contains characters not allowed in a header"
        ))
    })
}

impl CredentialValidator for HttpCredentialValidator {
    fn validate<'a>(
        &'a self,
        credentials: &'a CheckedCredentials,
    ) -> Pin<Box<dyn Future<Output = Result<(), ValidatorError>> + Send + 'a>> {
        Box::pin(async move {
            let mut authorization =
                header_value(&format!("Bearer {}", credentials.api_key.expose()), "API key")?;
            authorization.set_sensitive(true);

            let mut request = self
                .client
                .get(&self.url)
                .timeout(self.timeout)
                .header(AUTHORIZATION, authorization)
                .header("X-Client-Id", header_value(&credentials.client_id, "client ID")?)
                .header(
                    "X-Account-Name",
                    header_value(&credentials.account_name, "account name")?,
                );
            if let Some(account_id) = &credentials.account_id {
                request = request.header("X-Account-Id", header_value(account_id, "account ID")?);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    ValidatorError("validation service timed out".into())
                } else {
                    ValidatorError(format!("could not reach validation service: {e}"))
                }
            })?;

            let status = response.status();
            debug!(
                account_name = %credentials.account_name,
                status = status.as_u16(),
                "validation service responded"
            );

            if status.is_success() {
                return Ok(());
            }
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ValidatorError("invalid credentials".into()));
            }

            let body = response.text().await.unwrap_or_default();
            let body: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
            if body.is_empty() {
                Err(ValidatorError(format!(
                    "validation service returned {status}"
                )))
            } else {
                Err(ValidatorError(format!(
                    "validation service returned {status}: {body}"
                )))
            }
        })
    }
}
