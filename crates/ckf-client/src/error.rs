//! Error taxonomy for client operations.
//!
//! Every remote failure is caught at the component boundary and converted
//! to one of these variants; no error here is fatal to the process.

use thiserror::Error;

use crate::rpc::{AuthError, RpcError};
use crate::storage::StorageError;

/// Recoverable, inspectable error state returned by every client operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Identity provider failure; the session stays unauthenticated.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Remote call rejected. Triggers a `failed` deposit status only for
    /// deposit-affecting calls; otherwise state is left unchanged.
    #[error("remote call failed: {0}")]
    Rpc(#[from] RpcError),

    /// Rejected before any RPC call (e.g. non-positive price or amount).
    #[error("invalid request: {0}")]
    Validation(String),

    /// A prerequisite is missing (no deposit address, no selected asset).
    #[error("not found: {0}")]
    NotFound(String),

    /// Local persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ClientError::NotFound(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_human_readable() {
        let err = ClientError::validation("price must be positive");
        assert_eq!(err.to_string(), "invalid request: price must be positive");

        let err = ClientError::not_found("no deposit address for BTC");
        assert_eq!(err.to_string(), "not found: no deposit address for BTC");

        let err = ClientError::from(AuthError::new("provider unavailable"));
        assert!(err.to_string().contains("provider unavailable"));
    }
}
