use std::time::Duration;

use common::utils::config::AppConfig;
use serde::Deserialize;

use crate::utils::pdf_render::RenderOptions;

pub const DEFAULT_NOTE_META_TAG: &str = "data-note";

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub default_render: RenderOptions,
    pub status_ttl: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            default_render: RenderOptions::default(),
            status_ttl: Duration::from_secs(3600),
        }
    }
}

impl IngestionConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_render: RenderOptions::from_config(config),
            status_ttl: Duration::from_secs(config.status_ttl_secs),
        }
    }
}

/// Per-request knobs for a single ingestion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    pub create_note: bool,
    pub note_meta_tag: String,
    pub note_text: Option<String>,
    /// Overrides the configured render options when set.
    pub render: Option<RenderOptions>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            create_note: true,
            note_meta_tag: DEFAULT_NOTE_META_TAG.to_string(),
            note_text: None,
            render: None,
        }
    }
}
