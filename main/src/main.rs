mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use classification_pipeline::ClassificationService;
use common::{
    storage::{
        db::SurrealDbClient,
        repository::{
            CategoryCatalog, DocumentStore, SurrealCategoryCatalog, SurrealDocumentStore,
        },
        store::StorageManager,
        types::document::{Document, DocumentStatus},
    },
    utils::config::get_config,
};
use ingestion_pipeline::{
    pipeline::IngestionPipeline, train_from_store, DefaultPipelineServices, IngestionConfig,
    StatusQueryable, StoredArtifactText,
};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{Cli, Command};

/// Compact view of a stored document for terminal output.
#[derive(Debug, Serialize)]
struct DocumentSummary {
    id: String,
    url: String,
    title: String,
    status: DocumentStatus,
    categories: Vec<String>,
    attachment: Option<String>,
    size_bytes: Option<u64>,
}

impl From<&Document> for DocumentSummary {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id.clone(),
            url: document.url.clone(),
            title: document.title.clone(),
            status: document.status,
            categories: document.category_names(),
            attachment: document.pdf_attachment_name.clone(),
            size_bytes: document.size_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
struct CategorySummary {
    name: String,
    description: String,
    document_count: u64,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config().context("loading configuration")?;

    let db = SurrealDbClient::new(
        &config.surrealdb_address,
        &config.surrealdb_username,
        &config.surrealdb_password,
        &config.surrealdb_namespace,
        &config.surrealdb_database,
    )
    .await
    .context("connecting to SurrealDB")?;
    db.ensure_initialized().await?;

    let storage = StorageManager::new(&config)
        .await
        .context("opening object storage")?;
    info!(backend = ?storage.backend_kind(), "Object storage ready");

    let documents: Arc<dyn DocumentStore> =
        Arc::new(SurrealDocumentStore::new(db.clone(), storage.clone()));
    let catalog: Arc<dyn CategoryCatalog> = Arc::new(SurrealCategoryCatalog::new(db));

    let extractor = Arc::new(StoredArtifactText::new(Arc::clone(&documents)));
    let classifier =
        Arc::new(ClassificationService::from_config(&config, storage, extractor).await?);
    let services = Arc::new(DefaultPipelineServices::from_config(
        &config,
        Arc::clone(&classifier),
    )?);
    let pipeline = IngestionPipeline::with_services(
        Arc::clone(&documents),
        Arc::clone(&catalog),
        services,
        IngestionConfig::from_config(&config),
    );

    match cli.command {
        Command::Ingest(args) => {
            let options = args.options(&config);
            let result = pipeline.ingest_url(&args.url, options).await;

            // The status is tracked under the document id, which a failed run never returns.
            for id in pipeline.tracked_documents().await {
                if let Some(status) = pipeline.processing_status(&id).await {
                    print_json(&status)?;
                }
            }

            match result {
                Ok(response) => {
                    info!(id = %response.id, "Ingestion finished");
                    print_json(&response)?;
                }
                Err(err) => {
                    error!(error = %err, "Ingestion failed");
                    return Err(err.into());
                }
            }
        }
        Command::Train { max_documents } => {
            let report = train_from_store(documents.as_ref(), &classifier, max_documents).await?;
            print_json(&report)?;
        }
        Command::Reclassify { id } => {
            let document = pipeline.reclassify_document(&id).await?;
            print_json(&DocumentSummary::from(&document))?;
        }
        Command::ModelStatus => {
            print_json(&classifier.model_status().await)?;
        }
        Command::Delete { id } => {
            let removed = pipeline.delete_document(&id).await?;
            print_json(&DocumentSummary::from(&removed))?;
        }
        Command::Categories => {
            let categories: Vec<CategorySummary> = catalog
                .list()
                .await?
                .into_iter()
                .map(|category| CategorySummary {
                    name: category.name,
                    description: category.description,
                    document_count: category.document_count,
                })
                .collect();
            print_json(&categories)?;
        }
        Command::Documents { limit } => {
            let summaries: Vec<DocumentSummary> = documents
                .list(limit)
                .await?
                .iter()
                .map(DocumentSummary::from)
                .collect();
            print_json(&summaries)?;
        }
        Command::ExportPdf { id, output } => {
            let pdf = pipeline.document_pdf(&id).await?;
            tokio::fs::write(&output, &pdf)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            info!(path = %output.display(), bytes = pdf.len(), "PDF exported");
        }
    }

    Ok(())
}
