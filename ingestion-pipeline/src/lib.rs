#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod pipeline;
pub mod utils;

pub use pipeline::{
    DefaultPipelineServices, IngestOptions, IngestResponse, IngestionConfig, IngestionError,
    IngestionPipeline, PipelineServices, ProcessingStatus, ProcessingStep, StatusQueryable,
};
pub use utils::pdf_text::StoredArtifactText;

use classification_pipeline::{tfidf::TrainingReport, ClassificationService};
use common::{error::AppError, storage::repository::DocumentStore};
use tracing::{info, instrument};

/// How many stored documents a training run looks at by default.
pub const DEFAULT_TRAINING_LIMIT: usize = 1_000;

/// Trains the statistical classifier on up to `max_documents` stored, already categorised
/// documents that have a PDF attachment.
#[instrument(skip_all, fields(max_documents))]
pub async fn train_from_store(
    documents: &dyn DocumentStore,
    classifier: &ClassificationService,
    max_documents: usize,
) -> Result<TrainingReport, AppError> {
    let candidates: Vec<_> = documents
        .list(max_documents)
        .await?
        .into_iter()
        .filter(|document| !document.categories.is_empty() && document.has_attachment())
        .collect();
    info!(candidates = candidates.len(), "Training candidates loaded");

    classifier.train(&candidates).await
}
