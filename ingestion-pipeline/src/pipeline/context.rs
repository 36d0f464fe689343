use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        repository::{CategoryCatalog, DocumentStore},
        types::document::Document,
    },
};
use tracing::{error, info, warn};

use super::{
    config::IngestOptions,
    outcome::{IngestionError, StepOutcome},
    services::PipelineServices,
    status::{ProcessingStep, StatusHandle},
};
use crate::utils::pdf_render::RenderOptions;

pub struct PipelineContext<'a> {
    pub document_id: String,
    pub url: &'a str,
    pub options: &'a IngestOptions,
    pub render_options: RenderOptions,
    pub services: &'a dyn PipelineServices,
    pub documents: &'a dyn DocumentStore,
    pub catalog: &'a dyn CategoryCatalog,
    pub status: StatusHandle,
    pub document: Document,
    pub pdf: Option<Bytes>,
}

impl PipelineContext<'_> {
    pub async fn enter(&self, step: ProcessingStep) {
        info!(document_id = %self.document_id, %step, "{}", step.description());
        self.status.begin(step).await;
    }

    /// Records the outcome of `step`; a fatal outcome also fails the status and is returned.
    pub async fn settle(
        &mut self,
        step: ProcessingStep,
        outcome: StepOutcome,
    ) -> Result<(), IngestionError> {
        match outcome {
            StepOutcome::Success { message, payload } => {
                self.status.record(step, true, message, payload).await;
                Ok(())
            }
            StepOutcome::SoftFailure(message) => {
                warn!(document_id = %self.document_id, %step, %message, "Step failed, continuing");
                self.status.record(step, false, message, None).await;
                Ok(())
            }
            StepOutcome::Fatal(err) => {
                let message = err.to_string();
                self.status.record(step, false, message.clone(), None).await;
                self.status.fail(message).await;
                Err(self.abort(err))
            }
        }
    }

    pub fn pdf(&self) -> Result<Bytes, AppError> {
        self.pdf
            .clone()
            .ok_or_else(|| AppError::InternalError("rendered PDF expected to be available".into()))
    }

    pub fn abort(&self, err: IngestionError) -> IngestionError {
        error!(
            document_id = %self.document_id,
            url = %self.url,
            error = %err,
            "ingestion pipeline aborted"
        );
        err
    }
}
