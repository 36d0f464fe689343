use std::collections::HashMap;

use uuid::Uuid;

use crate::stored_object;

/// Lifecycle of a persisted document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    #[default]
    Processing,
    Stored,
    Failed,
}

/// One category label attached to a document, with the classifier that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryAssignment {
    pub name: String,
    pub confidence: f64,
    pub classifier: String,
}

impl CategoryAssignment {
    pub fn new(name: impl Into<String>, confidence: f64, classifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            classifier: classifier.into(),
        }
    }
}

stored_object!(Document, "document", {
    url: String,
    canonical_url: String,
    title: String,
    description: String,
    #[serde(default)]
    meta_tags: HashMap<String, String>,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    fetched_at: DateTime<Utc>,
    #[serde(default)]
    pdf_attachment_name: Option<String>,
    #[serde(default)]
    size_bytes: Option<u64>,
    #[serde(default)]
    categories: Vec<CategoryAssignment>,
    #[serde(default)]
    notes: Vec<String>,
    #[serde(default)]
    status: DocumentStatus
});

impl Document {
    /// A fresh document in the `Processing` state with a newly minted id.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            canonical_url: url.clone(),
            url,
            title: String::new(),
            description: String::new(),
            meta_tags: HashMap::new(),
            fetched_at: now,
            pdf_attachment_name: None,
            size_bytes: None,
            categories: Vec::new(),
            notes: Vec::new(),
            status: DocumentStatus::Processing,
        }
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    pub fn first_category(&self) -> Option<&str> {
        self.categories.first().map(|c| c.name.as_str())
    }

    pub fn has_attachment(&self) -> bool {
        self.pdf_attachment_name.is_some()
    }

    /// Title, description and meta-tag values joined by single spaces.
    pub fn metadata_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.meta_tags.len().saturating_add(2));
        parts.push(&self.title);
        parts.push(&self.description);
        parts.extend(self.meta_tags.values().map(String::as_str));
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_starts_processing_with_canonical_url() {
        let doc = Document::new("https://example.com/a");
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert_eq!(doc.canonical_url, "https://example.com/a");
        assert!(Uuid::parse_str(&doc.id).is_ok());
        assert!(!doc.has_attachment());
    }

    #[test]
    fn assignment_confidence_is_clamped() {
        assert!((CategoryAssignment::new("x", 1.7, "t").confidence - 1.0).abs() < f64::EPSILON);
        assert!(CategoryAssignment::new("x", -0.2, "t").confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&DocumentStatus::Stored).expect("serialize");
        assert_eq!(json, "\"STORED\"");
    }

    #[test]
    fn metadata_text_joins_fields() {
        let mut doc = Document::new("https://example.com");
        doc.title = "Rust".into();
        doc.description = "Systems".into();
        doc.meta_tags.insert("keywords".into(), "memory safety".into());
        assert_eq!(doc.metadata_text(), "Rust Systems memory safety");
    }
}
