use thiserror::Error;
use tokio::task::JoinError;

// Collaborator-level errors shared by every crate in the workspace
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Extraction error: {0}")]
    Extraction(String),
    #[error("Communication error: {0}")]
    Communication(String),
    #[error("Training error: {0}")]
    Training(String),
    #[error("Note error: {0}")]
    Note(String),
    #[error("Processing error: {0}")]
    Processing(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        match self {
            AppError::NotFound(_) => true,
            AppError::ObjectStore(object_store::Error::NotFound { .. }) => true,
            _ => false,
        }
    }

    /// Optimistic transaction clashes in SurrealDB; the same write succeeds when replayed.
    pub fn is_retryable_conflict(&self) -> bool {
        match self {
            AppError::Database(err) => err.to_string().contains("read or write conflict"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_database_errors_are_retryable() {
        assert!(!AppError::Processing("read or write conflict".into()).is_retryable_conflict());
        assert!(!AppError::NotFound("category".into()).is_retryable_conflict());
    }
}
