use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use common::{error::AppError, storage::types::document::Document, utils::config::AppConfig};
use serde::Serialize;
use tracing::{info, instrument};

const PDF_DIR: &str = "pdfs";
const MAX_NOTE_STEM: usize = 50;
const SNAPSHOT_TAG: &str = "page-snapshot";

/// Explicit note text wins; otherwise the value of `meta_tag` on the page, if any.
pub fn resolve_note_text<'a>(
    document: &'a Document,
    note_text: Option<&'a str>,
    meta_tag: &str,
) -> Option<&'a str> {
    note_text
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .or_else(|| document.meta_tags.get(meta_tag).map(String::as_str))
}

/// `{title stem}_{yyyyMMdd_HHmmss}.md`, using only ASCII letters, digits, `-` and `_`.
pub fn note_file_name(title: &str, fetched_at: DateTime<Utc>) -> String {
    let kept: String = title
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || ch.is_whitespace() || *ch == '-' || *ch == '_')
        .collect();
    let stem: String = kept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
        .chars()
        .take(MAX_NOTE_STEM)
        .collect();
    format!("{stem}_{}.md", fetched_at.format("%Y%m%d_%H%M%S"))
}

/// `512 B`, `1.5 KB`, `3.2 MB`...
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["KB", "MB", "GB", "TB", "PB", "EB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS.get(unit).copied().unwrap_or("EB"))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Serialize)]
struct FrontMatter<'a> {
    source_url: &'a str,
    title: &'a str,
    pdf_id: &'a str,
    fetched_at: String,
    tags: Vec<&'a str>,
}

/// Markdown body with YAML front matter.
pub fn render_note(document: &Document, note: Option<&str>) -> Result<String, AppError> {
    let fetched = timestamp(document.fetched_at);
    let front_matter = FrontMatter {
        source_url: &document.url,
        title: &document.title,
        pdf_id: &document.id,
        fetched_at: fetched.clone(),
        tags: document
            .categories
            .iter()
            .map(|category| category.name.as_str())
            .chain(std::iter::once(SNAPSHOT_TAG))
            .collect(),
    };
    let yaml = serde_yaml::to_string(&front_matter)
        .map_err(|err| AppError::Note(format!("could not write front matter: {err}")))?;

    let mut sections = vec![
        format!("---\n{yaml}---\n"),
        format!("# {}\n", document.title),
    ];

    if !document.description.trim().is_empty() {
        sections.push(format!("## Description\n{}\n", document.description));
    }

    if let Some(note) = note.filter(|note| !note.trim().is_empty()) {
        sections.push(format!("## Notes\n{note}\n"));
    }

    sections.push(format!(
        "## Resources\n[Download PDF](../{PDF_DIR}/{}.pdf)\n",
        document.id
    ));

    if !document.categories.is_empty() {
        let lines: Vec<String> = document
            .categories
            .iter()
            .map(|category| {
                format!(
                    "- {} (confidence: {:.2})",
                    category.name, category.confidence
                )
            })
            .collect();
        sections.push(format!("## Categories\n{}\n", lines.join("\n")));
    }

    let size = document
        .size_bytes
        .map_or_else(|| "unknown".to_string(), human_size);
    sections.push(format!(
        "## Metadata\n- **Fetched:** {fetched}\n- **Canonical URL:** {}\n- **PDF Size:** {size}\n",
        document.canonical_url
    ));

    Ok(sections.join("\n"))
}

/// Writes markdown notes plus a PDF copy into a vault directory.
#[derive(Debug, Clone)]
pub struct NoteExporter {
    vault: PathBuf,
}

impl NoteExporter {
    pub fn new(vault: impl Into<PathBuf>) -> Self {
        Self {
            vault: vault.into(),
        }
    }

    /// `None` when note export is switched off.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        config
            .obsidian_enabled
            .then(|| Self::new(&config.obsidian_vault_path))
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    fn confined(&self, relative: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(AppError::Note(format!(
                "path '{}' escapes the vault",
                relative.display()
            )));
        }
        Ok(self.vault.join(relative))
    }

    /// Writes the note and `pdfs/{id}.pdf`, returning the note's file name.
    #[instrument(skip_all, fields(document_id = %document.id))]
    pub async fn export(
        &self,
        document: &Document,
        pdf: &[u8],
        note: Option<&str>,
    ) -> Result<String, AppError> {
        if document.title.trim().is_empty() {
            return Err(AppError::Note("document title is required".into()));
        }

        let pdf_dir = self.confined(PDF_DIR)?;
        tokio::fs::create_dir_all(&pdf_dir).await?;

        let file_name = note_file_name(&document.title, document.fetched_at);
        let note_path = self.confined(&file_name)?;
        tokio::fs::write(&note_path, render_note(document, note)?).await?;

        let pdf_path = self.confined(&format!("{PDF_DIR}/{}.pdf", document.id))?;
        tokio::fs::write(&pdf_path, pdf).await?;

        info!(note = %note_path.display(), pdf_bytes = pdf.len(), "Note exported");
        Ok(file_name)
    }
}
