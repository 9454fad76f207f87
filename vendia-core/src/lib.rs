pub mod identity;
pub mod notify;
pub mod realtime;
pub mod repository;

/// Failure taxonomy shared across the engine. `TransientDependency` is
/// produced by best-effort collaborators (history append, broadcast,
/// notification) and is always recovered locally; the remaining variants
/// propagate to the caller of the primary operation.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transient dependency failure: {0}")]
    TransientDependency(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
