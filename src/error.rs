use thiserror::Error;
use uuid::Uuid;

/// Every error that crosses the component boundary is one of these four
/// kinds. Advisory failures never surface here; the scheduler absorbs them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found: {1}")]
    NotFound(&'static str, Uuid),

    /// Optimistic version mismatch on grading. The caller re-fetches and
    /// retries (or drops the stale grading); the core never retries itself.
    #[error("version conflict on flashcard {id}: expected version {expected}")]
    Conflict { id: Uuid, expected: i64 },

    #[error("storage error: {0}")]
    Persistence(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
