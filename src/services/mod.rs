pub mod review;
pub mod scheduler;
pub mod session;
pub mod statistics;

/// Error surface shared by the study services. `Validation` is raised before
/// any store access; `Conflict` only after the bounded internal retries in
/// the response processor have been exhausted. Store failures leave no
/// partial multi-field write behind (every mutation is one statement or one
/// transaction).
#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}
