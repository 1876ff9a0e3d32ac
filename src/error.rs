use thiserror::Error;

/// Error taxonomy for the ledger core. Every failure is request-scoped:
/// validation and not-found errors are the caller's to fix, collaborator
/// errors come from the backing store and carry its message through.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Caller-supplied input violates a precondition. Not retryable.
    #[error("{0}")]
    Validation(String),

    /// Referenced order, book or user does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The persistence/identity collaborator failed (network, permission,
    /// transient fault).
    #[error("{0}")]
    Collaborator(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }
}

impl From<mongodb::error::Error> for LedgerError {
    fn from(e: mongodb::error::Error) -> Self {
        Self::Collaborator(format!("Mongo error: {e}"))
    }
}
