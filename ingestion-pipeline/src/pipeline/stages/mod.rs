use common::{
    error::AppError,
    storage::{
        repository::{CategoryCatalog, DocumentStore},
        types::document::{Document, DocumentStatus},
    },
};
use serde_json::json;
use state_machines::core::GuardError;
use tracing::{debug, info, instrument, warn};

use super::{
    context::PipelineContext,
    outcome::{IngestionError, StepOutcome},
    services::PipelineServices,
    state::{Analyzed, Categorized, Completed, IngestionMachine, Ready, Rendered, Stored, Verified},
    status::ProcessingStep,
};
use crate::utils::{note_export::resolve_note_text, pdf_text::page_count, sanitize_attachment_name};

const PDF_CONTENT_TYPE: &str = "application/pdf";

#[instrument(level = "trace", skip_all, fields(document_id = %ctx.document_id))]
pub async fn verify(
    machine: IngestionMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Verified>, IngestionError> {
    let step = ProcessingStep::UrlVerification;
    ctx.enter(step).await;

    let outcome = match ctx.services.verify_url(ctx.url).await {
        Ok(()) => StepOutcome::success("URL is accessible"),
        Err(err) => StepOutcome::Fatal(IngestionError::Verification(err.to_string())),
    };
    ctx.settle(step, outcome).await?;

    machine
        .verify()
        .map_err(|(_, guard)| map_guard_error("verify", &guard))
}

#[instrument(level = "trace", skip_all, fields(document_id = %ctx.document_id))]
pub async fn render(
    machine: IngestionMachine<(), Verified>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Rendered>, IngestionError> {
    let step = ProcessingStep::PdfConversion;
    ctx.enter(step).await;

    let outcome = match ctx.services.render_pdf(ctx.url, &ctx.render_options).await {
        Ok(pdf) => {
            let size = pdf.len() as u64;
            let pages = match page_count(pdf.clone()).await {
                Ok(pages) => Some(pages),
                Err(err) => {
                    debug!(error = %err, "Could not count PDF pages");
                    None
                }
            };
            ctx.document.size_bytes = Some(size);
            ctx.pdf = Some(pdf);
            StepOutcome::success_with(
                "PDF generated successfully",
                json!({ "size_bytes": size, "pages": pages }),
            )
        }
        Err(err) => StepOutcome::Fatal(IngestionError::Rendering(err.to_string())),
    };
    ctx.settle(step, outcome).await?;

    machine
        .render()
        .map_err(|(_, guard)| map_guard_error("render", &guard))
}

#[instrument(level = "trace", skip_all, fields(document_id = %ctx.document_id))]
pub async fn store(
    machine: IngestionMachine<(), Rendered>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Stored>, IngestionError> {
    let step = ProcessingStep::Storage;
    ctx.enter(step).await;

    let outcome = match persist_document(ctx).await {
        Ok(attachment) => StepOutcome::success_with(
            format!("Document stored with id {}", ctx.document_id),
            json!({ "attachment": attachment, "title": ctx.document.title }),
        ),
        Err(err) => StepOutcome::Fatal(IngestionError::Storage(err.to_string())),
    };
    ctx.settle(step, outcome).await?;

    machine
        .store()
        .map_err(|(_, guard)| map_guard_error("store", &guard))
}

/// Scrapes metadata, saves the record, then uploads the PDF. Returns the attachment name.
async fn persist_document(ctx: &mut PipelineContext<'_>) -> Result<String, AppError> {
    let pdf = ctx.pdf()?;

    let metadata = ctx.services.extract_metadata(ctx.url).await;
    metadata.apply_to(&mut ctx.document);

    let attachment = format!("{}.pdf", sanitize_attachment_name(&ctx.document.title));
    ctx.document.pdf_attachment_name = Some(attachment.clone());
    ctx.document.status = DocumentStatus::Stored;
    ctx.document = ctx.documents.save(&ctx.document).await?;

    if let Err(err) = ctx
        .documents
        .save_attachment(&ctx.document_id, &attachment, pdf, PDF_CONTENT_TYPE)
        .await
    {
        ctx.document.status = DocumentStatus::Failed;
        if let Err(save_err) = ctx.documents.save(&ctx.document).await {
            warn!(error = %save_err, "Could not mark document as failed");
        }
        return Err(err);
    }

    debug!(attachment = %attachment, "Document and attachment persisted");
    Ok(attachment)
}

#[instrument(level = "trace", skip_all, fields(document_id = %ctx.document_id))]
pub async fn analyze(
    machine: IngestionMachine<(), Stored>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Analyzed>, IngestionError> {
    let step = ProcessingStep::ContentAnalysis;
    ctx.enter(step).await;

    let outcome = match ctx.services.analyze_content(&ctx.document).await {
        Ok(()) => StepOutcome::success("Content analyzed successfully"),
        Err(err) => StepOutcome::SoftFailure(format!("Content analysis failed: {err}")),
    };
    ctx.settle(step, outcome).await?;

    machine
        .analyze()
        .map_err(|(_, guard)| map_guard_error("analyze", &guard))
}

#[instrument(level = "trace", skip_all, fields(document_id = %ctx.document_id))]
pub async fn categorize(
    machine: IngestionMachine<(), Analyzed>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Categorized>, IngestionError> {
    let step = ProcessingStep::Categorization;
    ctx.enter(step).await;

    let outcome =
        match classify_and_record(ctx.services, ctx.documents, ctx.catalog, &ctx.document_id)
            .await
        {
            Ok(recorded) => {
                let names = recorded.document.category_names();
                ctx.document = recorded.document;
                if recorded.catalog_failures.is_empty() {
                    StepOutcome::success_with(
                        "Document categorized successfully",
                        json!({ "categories": names }),
                    )
                } else {
                    StepOutcome::SoftFailure(format!(
                        "Categorization partially failed: catalog not updated for {}",
                        recorded.catalog_failures.join(", ")
                    ))
                }
            }
            Err(err) => StepOutcome::SoftFailure(format!("Categorization failed: {err}")),
        };
    ctx.settle(step, outcome).await?;

    machine
        .categorize()
        .map_err(|(_, guard)| map_guard_error("categorize", &guard))
}

#[instrument(level = "trace", skip_all, fields(document_id = %ctx.document_id))]
pub async fn complete(
    machine: IngestionMachine<(), Categorized>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Completed>, IngestionError> {
    let note = export_note(ctx).await;

    let step = ProcessingStep::Completed;
    ctx.enter(step).await;
    let payload = note.map(|file| json!({ "note": file }));
    ctx.status
        .record(step, true, "Processing completed", payload)
        .await;
    ctx.status.complete().await;

    machine
        .complete()
        .map_err(|(_, guard)| map_guard_error("complete", &guard))
}

/// Note export never affects the pipeline result; failures are only logged.
async fn export_note(ctx: &PipelineContext<'_>) -> Option<String> {
    if !ctx.options.create_note {
        return None;
    }

    let pdf = match ctx.pdf() {
        Ok(pdf) => pdf,
        Err(err) => {
            warn!(document_id = %ctx.document_id, error = %err, "Skipping note export");
            return None;
        }
    };
    let note = resolve_note_text(
        &ctx.document,
        ctx.options.note_text.as_deref(),
        &ctx.options.note_meta_tag,
    );

    match ctx.services.create_note(&ctx.document, &pdf, note).await {
        Ok(Some(file)) => {
            info!(document_id = %ctx.document_id, note = %file, "Note created");
            Some(file)
        }
        Ok(None) => {
            debug!(document_id = %ctx.document_id, "Note export disabled");
            None
        }
        Err(err) => {
            warn!(document_id = %ctx.document_id, error = %err, "Note export failed");
            None
        }
    }
}

pub struct RecordedClassification {
    pub document: Document,
    /// Category names whose catalog entry could not be created or incremented.
    pub catalog_failures: Vec<String>,
}

/// Re-reads the stored document, classifies it, saves the assignments, and moves catalog
/// counters from the previous categories to the new ones.
pub async fn classify_and_record(
    services: &dyn PipelineServices,
    documents: &dyn DocumentStore,
    catalog: &dyn CategoryCatalog,
    document_id: &str,
) -> Result<RecordedClassification, AppError> {
    let mut document = documents.get(document_id).await?;
    let previous = document.category_names();

    document.categories = services.classify(&document).await?;
    let document = documents.save(&document).await?;

    for name in &previous {
        if let Err(err) = catalog.decrement_count(name).await {
            warn!(category = %name, error = %err, "Could not decrement category count");
        }
    }

    let mut catalog_failures = Vec::new();
    for assignment in &document.categories {
        if let Err(err) = catalog.ensure_category(&assignment.name).await {
            warn!(category = %assignment.name, error = %err, "Could not update category catalog");
            catalog_failures.push(assignment.name.clone());
        }
    }

    debug!(
        document_id,
        categories = document.categories.len(),
        "Classification recorded"
    );
    Ok(RecordedClassification {
        document,
        catalog_failures,
    })
}

fn map_guard_error(event: &str, guard: &GuardError) -> IngestionError {
    IngestionError::Internal(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}
