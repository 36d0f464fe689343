use std::{collections::BTreeMap, sync::Arc, time::Instant};

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        store::StorageManager,
        types::document::{CategoryAssignment, Document},
    },
    utils::config::AppConfig,
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::model::{TfIdfModel, TrainingParams};
use crate::text::{fuse_text, ArtifactText};

pub const CLASSIFIER_NAME: &str = "ml-tfidf";
pub const CLASSIFIER_VERSION: &str = "v1.0";
pub const STATISTICAL_CLASSIFIER_TAG: &str = "ml-tfidf-v1.0";

#[derive(Debug, Clone)]
pub struct StatisticalSettings {
    pub enabled: bool,
    pub confidence_threshold: f64,
    pub model_location: String,
    pub params: TrainingParams,
}

impl StatisticalSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enabled: config.ml_enabled,
            confidence_threshold: config.ml_confidence_threshold,
            model_location: config.ml_model_location.clone(),
            params: TrainingParams {
                min_document_frequency: config.ml_min_document_frequency,
                max_features: config.ml_max_features,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelStatus {
    pub enabled: bool,
    pub trained: bool,
    pub name: &'static str,
    pub version: &'static str,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrainingReport {
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub categories: Vec<String>,
}

/// TF-IDF classifier whose model is swapped atomically on each successful training run.
///
/// Readers clone the current `Arc` snapshot under a short read lock, so classification never
/// observes a half-built model. Training runs are serialised by `train_lock`.
pub struct StatisticalClassifier {
    settings: StatisticalSettings,
    storage: StorageManager,
    model: RwLock<Arc<TfIdfModel>>,
    train_lock: Mutex<()>,
}

impl StatisticalClassifier {
    pub fn new(settings: StatisticalSettings, storage: StorageManager) -> Self {
        Self {
            settings,
            storage,
            model: RwLock::new(Arc::new(TfIdfModel::default())),
            train_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub async fn is_trained(&self) -> bool {
        self.snapshot().await.trained
    }

    pub async fn snapshot(&self) -> Arc<TfIdfModel> {
        Arc::clone(&*self.model.read().await)
    }

    pub async fn status(&self) -> ModelStatus {
        let model = self.snapshot().await;
        ModelStatus {
            enabled: self.settings.enabled,
            trained: model.trained,
            name: CLASSIFIER_NAME,
            version: CLASSIFIER_VERSION,
            categories: model.categories(),
        }
    }

    /// Loads a previously persisted model, returning whether a trained one is now active.
    #[instrument(skip_all, fields(location = %self.settings.model_location))]
    pub async fn load(&self) -> Result<bool, AppError> {
        if !self.storage.exists(&self.settings.model_location).await? {
            debug!("No persisted model found");
            return Ok(false);
        }

        let bytes = self.storage.get(&self.settings.model_location).await?;
        let model: TfIdfModel = serde_json::from_slice(&bytes)?;
        let trained = model.trained;
        if trained {
            info!(
                vocabulary = model.vocabulary.len(),
                categories = model.category_vectors.len(),
                "Loaded persisted model"
            );
            *self.model.write().await = Arc::new(model);
        }
        Ok(trained)
    }

    /// Groups documents by their first category, fits a fresh model, persists it, then swaps it in.
    ///
    /// Documents without categories, without an attachment, or whose text cannot be extracted are
    /// skipped. On failure the active model is left untouched.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn train(
        &self,
        documents: &[Document],
        extractor: &dyn ArtifactText,
    ) -> Result<TrainingReport, AppError> {
        let _guard = self.train_lock.lock().await;
        let started = Instant::now();

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut skipped = 0usize;
        for document in documents {
            let Some(category) = document.first_category() else {
                skipped += 1;
                continue;
            };
            if !document.has_attachment() {
                skipped += 1;
                continue;
            }
            match extractor.artifact_text(document).await {
                Ok(text) => groups
                    .entry(category.to_string())
                    .or_default()
                    .push(fuse_text(document, &text)),
                Err(err) => {
                    warn!(document_id = %document.id, error = %err, "Skipping training document");
                    skipped += 1;
                }
            }
        }
        let processed: usize = groups.values().map(Vec::len).sum();

        let params = self.settings.params;
        let model =
            tokio::task::spawn_blocking(move || TfIdfModel::fit(&groups, params)).await??;

        self.persist(&model).await?;
        let categories = model.categories();
        *self.model.write().await = Arc::new(model);

        info!(
            processed,
            skipped,
            categories = categories.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Model trained"
        );

        Ok(TrainingReport {
            documents_processed: processed,
            documents_skipped: skipped,
            categories,
        })
    }

    /// Categories whose cosine similarity reaches the threshold; empty when disabled or untrained.
    pub async fn classify_text(&self, fused_text: &str) -> Vec<CategoryAssignment> {
        if !self.settings.enabled {
            return Vec::new();
        }
        let model = self.snapshot().await;
        if !model.trained {
            debug!("Model not trained, skipping statistical classification");
            return Vec::new();
        }

        let vector = model.vectorize(fused_text);
        let mut assignments: Vec<CategoryAssignment> = model
            .similarities(&vector)
            .into_iter()
            .filter(|(_, similarity)| *similarity >= self.settings.confidence_threshold)
            .map(|(category, similarity)| {
                CategoryAssignment::new(category, similarity, STATISTICAL_CLASSIFIER_TAG)
            })
            .collect();
        assignments.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        assignments
    }

    async fn persist(&self, model: &TfIdfModel) -> Result<(), AppError> {
        let payload = serde_json::to_vec(model)?;
        self.storage
            .put(&self.settings.model_location, Bytes::from(payload))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, Ordering},
    };

    use async_trait::async_trait;

    use super::*;

    struct FixedText(HashMap<String, String>);

    #[async_trait]
    impl ArtifactText for FixedText {
        async fn artifact_text(&self, document: &Document) -> Result<String, AppError> {
            self.0
                .get(&document.id)
                .cloned()
                .ok_or_else(|| AppError::Extraction("no text".into()))
        }
    }

    fn settings(enabled: bool) -> StatisticalSettings {
        StatisticalSettings {
            enabled,
            confidence_threshold: 0.6,
            model_location: "models/test-model.json".into(),
            params: TrainingParams::default(),
        }
    }

    fn labelled(category: &str, text: &str, texts: &mut HashMap<String, String>) -> Document {
        let mut doc = Document::new("https://example.com");
        doc.pdf_attachment_name = Some("page.pdf".into());
        doc.categories = vec![CategoryAssignment::new(category, 1.0, "manual")];
        texts.insert(doc.id.clone(), text.to_string());
        doc
    }

    fn training_set() -> (Vec<Document>, FixedText) {
        let mut texts = HashMap::new();
        let docs = vec![
            labelled("Technology", "rust compiler memory borrow", &mut texts),
            labelled("Technology", "rust compiler memory cargo", &mut texts),
            labelled("Cooking", "garlic tomato recipe pasta", &mut texts),
            labelled("Cooking", "garlic tomato recipe soup", &mut texts),
        ];
        (docs, FixedText(texts))
    }

    #[tokio::test]
    async fn train_persists_and_classifies() {
        let storage = StorageManager::memory();
        let classifier = StatisticalClassifier::new(settings(true), storage.clone());
        let (docs, extractor) = training_set();

        let report = classifier.train(&docs, &extractor).await.expect("train");
        assert_eq!(report.documents_processed, 4);
        assert_eq!(report.categories, vec!["Cooking", "Technology"]);
        assert!(storage
            .exists("models/test-model.json")
            .await
            .expect("exists"));

        let result = classifier
            .classify_text("notes on the rust compiler and memory")
            .await;
        assert_eq!(result.first().map(|a| a.name.as_str()), Some("Technology"));
        assert!(result
            .iter()
            .all(|a| a.classifier == STATISTICAL_CLASSIFIER_TAG && a.confidence >= 0.6));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn classify_during_training_sees_whole_models_only() {
        const QUERY: &str = "notes on the rust compiler and memory";

        let (docs, extractor) = training_set();
        let reference = StatisticalClassifier::new(settings(true), StorageManager::memory());
        reference.train(&docs, &extractor).await.expect("reference train");
        let expected = reference.classify_text(QUERY).await;
        assert!(!expected.is_empty());

        let classifier = Arc::new(StatisticalClassifier::new(
            settings(true),
            StorageManager::memory(),
        ));
        let training_done = Arc::new(AtomicBool::new(false));

        let reader = {
            let classifier = Arc::clone(&classifier);
            let training_done = Arc::clone(&training_done);
            tokio::spawn(async move {
                let mut observed = Vec::new();
                loop {
                    observed.push(classifier.classify_text(QUERY).await);
                    if training_done.load(Ordering::SeqCst) {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                observed
            })
        };

        let (first, second) = tokio::join!(
            classifier.train(&docs, &extractor),
            classifier.train(&docs, &extractor)
        );
        training_done.store(true, Ordering::SeqCst);

        assert_eq!(first.expect("first train").documents_processed, 4);
        assert_eq!(second.expect("second train").documents_processed, 4);

        let observed = reader.await.expect("reader");
        assert!(!observed.is_empty());
        for result in &observed {
            assert!(
                result.is_empty() || *result == expected,
                "partial model observed: {result:?}"
            );
        }
        assert_eq!(classifier.classify_text(QUERY).await, expected);
    }

    #[tokio::test]
    async fn unusable_documents_are_skipped() {
        let classifier = StatisticalClassifier::new(settings(true), StorageManager::memory());
        let (mut docs, extractor) = training_set();

        let mut uncategorised = Document::new("https://example.com/u");
        uncategorised.pdf_attachment_name = Some("u.pdf".into());
        let mut no_attachment = Document::new("https://example.com/n");
        no_attachment.categories = vec![CategoryAssignment::new("Technology", 1.0, "manual")];
        let mut no_text = Document::new("https://example.com/t");
        no_text.pdf_attachment_name = Some("t.pdf".into());
        no_text.categories = vec![CategoryAssignment::new("Cooking", 1.0, "manual")];
        docs.extend([uncategorised, no_attachment, no_text]);

        let report = classifier.train(&docs, &extractor).await.expect("train");
        assert_eq!(report.documents_processed, 4);
        assert_eq!(report.documents_skipped, 3);
    }

    #[tokio::test]
    async fn failed_training_keeps_previous_model() {
        let classifier = StatisticalClassifier::new(settings(true), StorageManager::memory());
        let (docs, extractor) = training_set();
        classifier.train(&docs, &extractor).await.expect("train");
        let before = classifier.snapshot().await;

        let err = classifier
            .train(&[Document::new("https://example.com")], &extractor)
            .await
            .expect_err("nothing usable");
        assert!(matches!(err, AppError::Training(_)));
        assert_eq!(*classifier.snapshot().await, *before);
    }

    #[tokio::test]
    async fn disabled_or_untrained_returns_nothing() {
        let untrained = StatisticalClassifier::new(settings(true), StorageManager::memory());
        assert!(untrained.classify_text("rust compiler").await.is_empty());

        let disabled = StatisticalClassifier::new(settings(false), StorageManager::memory());
        let (docs, extractor) = training_set();
        disabled.train(&docs, &extractor).await.expect("train");
        assert!(disabled.classify_text("rust compiler memory").await.is_empty());
    }

    #[tokio::test]
    async fn load_restores_persisted_model() {
        let storage = StorageManager::memory();
        let (docs, extractor) = training_set();
        let first = StatisticalClassifier::new(settings(true), storage.clone());
        first.train(&docs, &extractor).await.expect("train");

        let second = StatisticalClassifier::new(settings(true), storage);
        assert!(!second.is_trained().await);
        assert!(second.load().await.expect("load"));
        let (restored, original) = (second.snapshot().await, first.snapshot().await);
        assert_eq!(restored.vocabulary, original.vocabulary);
        assert_eq!(restored.categories(), original.categories());

        let status = second.status().await;
        assert!(status.trained);
        assert_eq!(status.name, CLASSIFIER_NAME);
        assert_eq!(status.categories.len(), 2);
    }

    #[tokio::test]
    async fn load_without_artifact_reports_untrained() {
        let classifier = StatisticalClassifier::new(settings(true), StorageManager::memory());
        assert!(!classifier.load().await.expect("load"));
    }
}
