use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use classification_pipeline::ArtifactText;
use common::{
    error::AppError,
    storage::{repository::DocumentStore, types::document::Document},
};
use tracing::debug;

/// Extracted text beyond this many characters is dropped.
pub const MAX_TEXT_LENGTH: usize = 100_000;

/// Plain text of a PDF, truncated to [`MAX_TEXT_LENGTH`] characters. Empty input yields "".
pub async fn extract_text(pdf: Bytes) -> Result<String, AppError> {
    if pdf.is_empty() {
        return Ok(String::new());
    }

    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
        .await?
        .map_err(|err| AppError::Extraction(format!("failed to extract text from PDF: {err}")))?;

    let text = text.trim();
    Ok(match text.char_indices().nth(MAX_TEXT_LENGTH) {
        Some((cut, _)) => text.get(..cut).unwrap_or(text).to_string(),
        None => text.to_string(),
    })
}

/// Number of pages in a PDF. Empty input yields 0.
pub async fn page_count(pdf: Bytes) -> Result<usize, AppError> {
    if pdf.is_empty() {
        return Ok(0);
    }

    tokio::task::spawn_blocking(move || {
        lopdf::Document::load_mem(&pdf)
            .map(|document| document.get_pages().len())
            .map_err(|err| AppError::Extraction(format!("failed to parse PDF: {err}")))
    })
    .await?
}

/// Reads a document's stored PDF attachment and extracts its text.
pub struct StoredArtifactText {
    documents: Arc<dyn DocumentStore>,
}

impl StoredArtifactText {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl ArtifactText for StoredArtifactText {
    async fn artifact_text(&self, document: &Document) -> Result<String, AppError> {
        let name = document.pdf_attachment_name.as_deref().ok_or_else(|| {
            AppError::Extraction(format!("document {} has no attachment", document.id))
        })?;
        let pdf = self.documents.get_attachment(&document.id, name).await?;
        let text = extract_text(pdf).await?;
        debug!(document_id = %document.id, chars = text.len(), "Artifact text extracted");
        Ok(text)
    }
}
