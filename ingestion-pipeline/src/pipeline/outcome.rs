use common::error::AppError;
use thiserror::Error;

/// Fatal ingestion failures surfaced to the caller of `ingest_url`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestionError {
    #[error("URL verification failed: {0}")]
    Verification(String),
    #[error("PDF generation failed: {0}")]
    Rendering(String),
    #[error("Storage failed: {0}")]
    Storage(String),
    #[error("Ingestion failed: {0}")]
    Internal(String),
}

impl From<IngestionError> for AppError {
    fn from(err: IngestionError) -> Self {
        AppError::Processing(err.to_string())
    }
}

/// How a step ended. Only `Fatal` stops the pipeline.
#[derive(Debug)]
pub enum StepOutcome {
    Success {
        message: String,
        payload: Option<serde_json::Value>,
    },
    SoftFailure(String),
    Fatal(IngestionError),
}

impl StepOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        StepOutcome::Success {
            message: message.into(),
            payload: None,
        }
    }

    pub fn success_with(message: impl Into<String>, payload: serde_json::Value) -> Self {
        StepOutcome::Success {
            message: message.into(),
            payload: Some(payload),
        }
    }
}
