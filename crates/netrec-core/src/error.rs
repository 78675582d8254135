//! Error types for netrec

use thiserror::Error;

/// Main error type for netrec operations
#[derive(Error, Debug)]
pub enum Error {
    /// Guard-clause denial. Always user-correctable.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Quota exceeded for {resource} (tenant {tenant})")]
    QuotaExceeded { tenant: String, resource: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource already exists with matching semantics.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid address input: {0}")]
    InvalidAddressInput(String),

    /// Store or quota collaborator failure, propagated unchanged.
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Address pool exhausted: {0}")]
    PoolExhausted(String),

    /// The primary write committed but its auxiliary reconciliation did not.
    #[error("Reconciliation of {kind} {id} failed: {source}")]
    Reconciliation {
        kind: String,
        id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a policy violation error
    pub fn policy(action: impl Into<String>) -> Self {
        Error::PolicyViolation(action.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    /// Create an invalid address input error
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Error::InvalidAddressInput(msg.into())
    }

    /// Create an upstream failure error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Error::UpstreamFailure(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Wrap a reconciliation failure for the resource identified by `kind`/`id`
    pub fn reconciliation(kind: impl Into<String>, id: impl ToString, source: Error) -> Self {
        Error::Reconciliation {
            kind: kind.into(),
            id: id.to_string(),
            source: Box::new(source),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Whether this error maps to a 4xx-equivalent response
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::PolicyViolation(_)
                | Error::QuotaExceeded { .. }
                | Error::NotFound(_)
                | Error::Conflict(_)
                | Error::InvalidAddressInput(_)
                | Error::Validation(_)
        )
    }
}

impl From<ipnetwork::IpNetworkError> for Error {
    fn from(err: ipnetwork::IpNetworkError) -> Self {
        Error::InvalidAddressInput(err.to_string())
    }
}
