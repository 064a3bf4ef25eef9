//! Registry error types.

use thiserror::Error;

/// Errors returned by [`Registry`](crate::Registry) implementations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry address could not be used.
    #[error("invalid registry address: {0}")]
    InvalidAddress(String),

    /// The HTTP request to the registry failed.
    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The registry answered with a non-success status.
    #[error("registry returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// The registry refused the operation.
    #[error("registry rejected {id}: {reason}")]
    Rejected {
        /// Record id.
        id: String,
        /// Explanation.
        reason: String,
    },
}

impl RegistryError {
    /// Create a rejection error.
    pub fn rejected(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
