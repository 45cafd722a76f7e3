//! Credential validation gate
//!
//! Submitted fields are trimmed once by the handler, checked for format
//! here, and only then handed to the remote `CredentialValidator`. The
//! format checks themselves never trim.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::Deserialize;

pub const MAX_ACCOUNT_NAME_LEN: usize = 64;
pub const MAX_CLIENT_ID_LEN: usize = 128;
pub const MAX_API_KEY_LEN: usize = 256;

/// Why a submission was rejected. Reported to the browser as
/// `{success:false, error}` with HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("account name cannot be empty")]
    EmptyAccountName,

    #[error("account name must be at most 64 characters")]
    AccountNameTooLong,

    #[error("account name may only contain letters, digits, '-' and '_'")]
    AccountNameInvalidChars,

    #[error("client ID cannot be empty")]
    EmptyClientId,

    #[error("client ID must be at most 128 characters")]
    ClientIdTooLong,

    #[error("API key cannot be empty")]
    EmptyApiKey,

    #[error("API key must be at most 256 characters")]
    ApiKeyTooLong,

    #[error("credential validation failed: {0}")]
    Rejected(String),
}

pub fn validate_account_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyAccountName);
    }
    if name.chars().count() > MAX_ACCOUNT_NAME_LEN {
        return Err(ValidationError::AccountNameTooLong);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::AccountNameInvalidChars);
    }
    Ok(())
}

pub fn validate_client_id(client_id: &str) -> Result<(), ValidationError> {
    if client_id.is_empty() {
        return Err(ValidationError::EmptyClientId);
    }
    if client_id.chars().count() > MAX_CLIENT_ID_LEN {
        return Err(ValidationError::ClientIdTooLong);
    }
    Ok(())
}

pub fn validate_api_key(api_key: &str) -> Result<(), ValidationError> {
    if api_key.is_empty() {
        return Err(ValidationError::EmptyApiKey);
    }
    if api_key.chars().count() > MAX_API_KEY_LEN {
        return Err(ValidationError::ApiKeyTooLong);
    }
    Ok(())
}

/// JSON body accepted by `/validate` and `/submit`.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub api_key: Secret<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// A submission after trimming, with every format check passed.
#[derive(Debug, Clone)]
pub struct CheckedCredentials {
    pub account_name: String,
    pub client_id: String,
    pub api_key: Secret<String>,
    pub account_id: Option<String>,
}

impl CredentialsRequest {
    /// Trim surrounding whitespace once, then run the format checks.
    ///
    /// A blank `account_id` is treated as absent.
    pub fn check(&self) -> Result<CheckedCredentials, ValidationError> {
        let account_name = self.account_name.trim();
        let client_id = self.client_id.trim();
        let api_key = self.api_key.expose().trim();

        validate_account_name(account_name)?;
        validate_client_id(client_id)?;
        validate_api_key(api_key)?;

        let account_id = self
            .account_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(CheckedCredentials {
            account_name: account_name.to_string(),
            client_id: client_id.to_string(),
            api_key: Secret::new(api_key.to_string()),
            account_id,
        })
    }
}

/// Error from a `CredentialValidator`, shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidatorError(pub String);

/// Live check of submitted credentials against the remote service.
///
/// Uses a boxed future so the server can hold `Arc<dyn CredentialValidator>`.
pub trait CredentialValidator: Send + Sync {
    fn validate<'a>(
        &'a self,
        credentials: &'a CheckedCredentials,
    ) -> Pin<Box<dyn Future<Output = Result<(), ValidatorError>> + Send + 'a>>;
}

/// Run the format checks, then the remote validator.
pub async fn validate_request(
    request: &CredentialsRequest,
    validator: &dyn CredentialValidator,
) -> Result<CheckedCredentials, ValidationError> {
    let checked = request.check()?;
    validator
        .validate(&checked)
        .await
        .map_err(|e| ValidationError::Rejected(e.0))?;
    Ok(checked)
}
