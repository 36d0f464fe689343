mod config;
mod context;
mod outcome;
mod services;
mod stages;
mod state;
mod status;

pub use config::{IngestOptions, IngestionConfig, DEFAULT_NOTE_META_TAG};
pub use outcome::{IngestionError, StepOutcome};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};
pub use status::{ProcessingStatus, ProcessingStep, StatusTracker, StepResult};

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        repository::{CategoryCatalog, DocumentStore},
        types::document::{Document, DocumentStatus},
    },
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use self::{
    context::PipelineContext,
    stages::{analyze, categorize, classify_and_record, complete, render, store, verify},
    state::ready,
};

/// Reference to a freshly ingested document.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestResponse {
    pub id: String,
    pub status: DocumentStatus,
    pub pdf_url: String,
}

impl IngestResponse {
    fn for_document(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: DocumentStatus::Stored,
            pdf_url: format!("/api/v1/documents/{id}/pdf"),
        }
    }
}

/// Read access to per-ingestion progress.
#[async_trait]
pub trait StatusQueryable: Send + Sync {
    async fn processing_status(&self, document_id: &str) -> Option<ProcessingStatus>;

    async fn remove_processing_status(&self, document_id: &str) -> bool;

    async fn tracked_documents(&self) -> Vec<String>;
}

#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    documents: Arc<dyn DocumentStore>,
    catalog: Arc<dyn CategoryCatalog>,
    services: Arc<dyn PipelineServices>,
    tracker: StatusTracker,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn with_services(
        documents: Arc<dyn DocumentStore>,
        catalog: Arc<dyn CategoryCatalog>,
        services: Arc<dyn PipelineServices>,
        config: IngestionConfig,
    ) -> Self {
        let tracker = StatusTracker::new(config.status_ttl);
        Self {
            documents,
            catalog,
            services,
            tracker,
            config,
        }
    }

    pub fn documents(&self) -> &dyn DocumentStore {
        self.documents.as_ref()
    }

    pub fn catalog(&self) -> &dyn CategoryCatalog {
        self.catalog.as_ref()
    }

    /// Runs every step for `url` and returns the stored document's reference.
    ///
    /// Verification, rendering and storage failures abort with an [`IngestionError`]; the
    /// status entry keeps the failed step either way.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn ingest_url(
        &self,
        url: &str,
        options: IngestOptions,
    ) -> Result<IngestResponse, IngestionError> {
        let document = Document::new(url.trim());
        let document_id = document.id.clone();
        let status = self.tracker.create(&document_id).await;
        let render_options = options
            .render
            .clone()
            .unwrap_or_else(|| self.config.default_render.clone());

        let mut ctx = PipelineContext {
            document_id: document_id.clone(),
            url: &document.url,
            options: &options,
            render_options,
            services: self.services.as_ref(),
            documents: self.documents.as_ref(),
            catalog: self.catalog.as_ref(),
            status,
            document: document.clone(),
            pdf: None,
        };

        let started = Instant::now();
        info!(document_id = %document_id, "ingestion started");

        let machine = ready();
        let machine = verify(machine, &mut ctx).await?;
        let machine = render(machine, &mut ctx).await?;
        let machine = store(machine, &mut ctx).await?;
        let machine = analyze(machine, &mut ctx).await?;
        let machine = categorize(machine, &mut ctx).await?;
        let _machine = complete(machine, &mut ctx).await?;

        info!(
            document_id = %document_id,
            categories = ctx.document.categories.len(),
            total_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "ingestion pipeline finished"
        );

        Ok(IngestResponse::for_document(&document_id))
    }

    /// Re-runs the classifier ensemble over a stored document.
    #[instrument(skip(self))]
    pub async fn reclassify_document(&self, document_id: &str) -> Result<Document, AppError> {
        let recorded = classify_and_record(
            self.services.as_ref(),
            self.documents.as_ref(),
            self.catalog.as_ref(),
            document_id,
        )
        .await?;
        if !recorded.catalog_failures.is_empty() {
            warn!(
                failures = ?recorded.catalog_failures,
                "Reclassified with incomplete catalog updates"
            );
        }
        Ok(recorded.document)
    }

    /// Removes the document, its attachments, its status entry, and its share of category counts.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, document_id: &str) -> Result<Document, AppError> {
        let removed = self.documents.delete(document_id).await?;
        for name in removed.category_names() {
            if let Err(err) = self.catalog.decrement_count(&name).await {
                warn!(category = %name, error = %err, "Could not decrement category count");
            }
        }
        self.tracker.remove(document_id).await;
        info!(categories = removed.categories.len(), "Document deleted");
        Ok(removed)
    }

    /// The stored PDF of a document.
    pub async fn document_pdf(&self, document_id: &str) -> Result<Bytes, AppError> {
        let document = self.documents.get(document_id).await?;
        let name = document
            .pdf_attachment_name
            .as_deref()
            .ok_or_else(|| AppError::NotFound(format!("PDF of document {document_id}")))?;
        self.documents.get_attachment(document_id, name).await
    }
}

#[async_trait]
impl StatusQueryable for IngestionPipeline {
    async fn processing_status(&self, document_id: &str) -> Option<ProcessingStatus> {
        self.tracker.get(document_id).await
    }

    async fn remove_processing_status(&self, document_id: &str) -> bool {
        self.tracker.remove(document_id).await
    }

    async fn tracked_documents(&self) -> Vec<String> {
        self.tracker.ids().await
    }
}
