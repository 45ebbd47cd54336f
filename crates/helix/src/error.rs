//! Client error types.

use reqwest::StatusCode;
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by token acquisition and request dispatch.
///
/// Resource lookups never surface through this type: a missing or
/// failed resource resolves to `None` at the facade. Only credential
/// and transport failures are raised.
#[derive(Debug, Error)]
pub enum HelixError {
    /// A credential is absent or blank.
    #[error("missing {0} - add it to the client settings")]
    MissingCredentials(&'static str),

    /// The token endpoint rejected the client-credentials exchange.
    #[error("token endpoint returned status {status}")]
    TokenRequest { status: StatusCode },

    /// The token endpoint answered with a success status but a
    /// malformed payload.
    #[error("invalid token response: {0}")]
    InvalidTokenResponse(String),

    /// An authenticated dispatch was attempted with no active token.
    /// This is a caller bug, not a provider failure.
    #[error("authenticated dispatch attempted without an active token")]
    MissingToken,

    /// The response did not arrive within the configured deadline.
    #[error("request for {resource} timed out after {timeout_ms}ms")]
    Timeout {
        resource: &'static str,
        timeout_ms: u64,
    },

    /// Any other transport-level failure (DNS, connection reset, ...).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The persistent token store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
