use async_trait::async_trait;
use common::{error::AppError, storage::types::document::Document};

/// Common English function words ignored by the statistical classifier.
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one", "our",
    "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see", "two",
    "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too", "use", "any", "may",
    "with", "this", "that", "from", "they", "were", "been", "have", "what", "your",
];

/// Source of the plain text held in a document's rendered artifact.
#[async_trait]
pub trait ArtifactText: Send + Sync {
    async fn artifact_text(&self, document: &Document) -> Result<String, AppError>;
}

/// Lower-cases, splits on anything that is not a letter or digit, and drops short and stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 2)
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Metadata followed by the artifact text; training and inference share this layout.
pub fn fuse_text(document: &Document, artifact_text: &str) -> String {
    format!("{} {}", document.metadata_text(), artifact_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_short_and_stop_words() {
        let tokens = tokenize("The Rust_compiler is FAST, and it's safe!");
        assert_eq!(tokens, vec!["rust", "compiler", "fast", "safe"]);
    }

    #[test]
    fn tokenize_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  -- ").is_empty());
    }

    #[test]
    fn fuse_text_puts_metadata_first() {
        let mut doc = Document::new("https://example.com");
        doc.title = "Title".into();
        doc.description = "Desc".into();
        assert_eq!(fuse_text(&doc, "body"), "Title Desc body");
    }
}
