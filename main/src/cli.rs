use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use common::utils::config::{AppConfig, PageFormat};
use ingestion_pipeline::{
    pipeline::DEFAULT_NOTE_META_TAG, utils::pdf_render::RenderOptions, IngestOptions,
    DEFAULT_TRAINING_LIMIT,
};

#[derive(Debug, Parser)]
#[command(
    name = "pagevault",
    version,
    about = "Archive web pages as PDFs and sort them into categories"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Verify, render, store and categorise a URL
    Ingest(IngestArgs),
    /// Train the statistical classifier from stored, categorised documents
    Train {
        #[arg(long, default_value_t = DEFAULT_TRAINING_LIMIT)]
        max_documents: usize,
    },
    /// Re-run classification for a stored document
    Reclassify { id: String },
    /// Show whether a statistical model is loaded and which categories it knows
    ModelStatus,
    /// Delete a document together with its PDF
    Delete { id: String },
    /// List the category catalog
    Categories,
    /// List recently stored documents
    Documents {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Write the stored PDF of a document to disk
    ExportPdf { id: String, output: PathBuf },
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    pub url: String,

    /// Skip the markdown note export for this page
    #[arg(long)]
    pub no_note: bool,

    /// Note text to embed instead of the page's own note meta tag
    #[arg(long)]
    pub note: Option<String>,

    /// Meta tag name read for the note text
    #[arg(long, default_value = DEFAULT_NOTE_META_TAG)]
    pub note_meta_tag: String,

    /// Paper size: a3, a4, letter or legal
    #[arg(long)]
    pub page_format: Option<PageFormat>,

    /// Render timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print only the first page
    #[arg(long)]
    pub first_page_only: bool,

    /// Leave CSS backgrounds out of the PDF
    #[arg(long)]
    pub no_background: bool,
}

impl IngestArgs {
    pub fn options(&self, config: &AppConfig) -> IngestOptions {
        IngestOptions {
            create_note: !self.no_note,
            note_meta_tag: self.note_meta_tag.clone(),
            note_text: self.note.clone(),
            render: self.render_options(config),
        }
    }

    /// Configured render options with any command-line overrides applied.
    fn render_options(&self, config: &AppConfig) -> Option<RenderOptions> {
        let overridden = self.page_format.is_some()
            || self.timeout.is_some()
            || self.first_page_only
            || self.no_background;
        if !overridden {
            return None;
        }

        let mut options = RenderOptions::from_config(config);
        if let Some(format) = self.page_format {
            options.page_format = format;
        }
        if let Some(timeout) = self.timeout {
            options.timeout_seconds = timeout;
        }
        if self.first_page_only {
            options.full_page = false;
        }
        if self.no_background {
            options.print_background = false;
        }
        Some(options)
    }
}
