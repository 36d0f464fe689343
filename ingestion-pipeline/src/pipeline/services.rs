use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use classification_pipeline::ClassificationService;
use common::{
    error::AppError,
    storage::types::document::{CategoryAssignment, Document},
    utils::config::AppConfig,
};
use tracing::{debug, info};

use crate::utils::{
    note_export::NoteExporter,
    page_metadata::{MetadataFetcher, PageMetadata},
    pdf_render::{ChromeRenderer, RenderOptions},
    url_verification::UrlVerifier,
};

/// External collaborators the orchestrator drives, one method per step.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn verify_url(&self, url: &str) -> Result<(), AppError>;

    async fn render_pdf(&self, url: &str, options: &RenderOptions) -> Result<Bytes, AppError>;

    /// Best effort: falls back to placeholder values instead of failing.
    async fn extract_metadata(&self, url: &str) -> PageMetadata;

    async fn analyze_content(&self, document: &Document) -> Result<(), AppError>;

    async fn classify(&self, document: &Document) -> Result<Vec<CategoryAssignment>, AppError>;

    /// Returns the written note's file name, or `None` when note export is disabled.
    async fn create_note(
        &self,
        document: &Document,
        pdf: &[u8],
        note: Option<&str>,
    ) -> Result<Option<String>, AppError>;
}

pub struct DefaultPipelineServices {
    verifier: UrlVerifier,
    renderer: ChromeRenderer,
    metadata: MetadataFetcher,
    classifier: Arc<ClassificationService>,
    notes: Option<NoteExporter>,
}

impl DefaultPipelineServices {
    pub fn new(
        verifier: UrlVerifier,
        renderer: ChromeRenderer,
        metadata: MetadataFetcher,
        classifier: Arc<ClassificationService>,
        notes: Option<NoteExporter>,
    ) -> Self {
        Self {
            verifier,
            renderer,
            metadata,
            classifier,
            notes,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        classifier: Arc<ClassificationService>,
    ) -> Result<Self, AppError> {
        let notes = NoteExporter::from_config(config);
        match &notes {
            Some(exporter) => info!(vault = %exporter.vault().display(), "Note export enabled"),
            None => info!("Note export disabled"),
        }
        Ok(Self::new(
            UrlVerifier::from_config(config)?,
            ChromeRenderer::from_config(config),
            MetadataFetcher::from_config(config)?,
            classifier,
            notes,
        ))
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn verify_url(&self, url: &str) -> Result<(), AppError> {
        self.verifier.verify(url).await.map(|_| ())
    }

    async fn render_pdf(&self, url: &str, options: &RenderOptions) -> Result<Bytes, AppError> {
        self.renderer.render(url, options).await
    }

    async fn extract_metadata(&self, url: &str) -> PageMetadata {
        self.metadata.fetch(url).await
    }

    async fn analyze_content(&self, document: &Document) -> Result<(), AppError> {
        // Hook for deeper text analysis; stored documents need none today.
        debug!(document_id = %document.id, "Content analysis hook");
        Ok(())
    }

    async fn classify(&self, document: &Document) -> Result<Vec<CategoryAssignment>, AppError> {
        Ok(self.classifier.classify(document).await)
    }

    async fn create_note(
        &self,
        document: &Document,
        pdf: &[u8],
        note: Option<&str>,
    ) -> Result<Option<String>, AppError> {
        match &self.notes {
            Some(exporter) => exporter.export(document, pdf, note).await.map(Some),
            None => Ok(None),
        }
    }
}
