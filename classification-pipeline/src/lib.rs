#![allow(clippy::missing_docs_in_private_items)]

pub mod heuristic;
pub mod merger;
pub mod remote;
pub mod service;
pub mod text;
pub mod tfidf;

pub use merger::merge_assignments;
pub use remote::{McpClient, RemoteClassifier};
pub use service::ClassificationService;
pub use text::ArtifactText;
