use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        store::StorageManager,
        types::document::{CategoryAssignment, Document},
    },
    utils::config::AppConfig,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    heuristic::{KeywordDomainClassifier, PatternDensityClassifier},
    merger::merge_assignments,
    remote::{McpClient, RemoteClassificationRequest, RemoteClassifier},
    text::{fuse_text, ArtifactText},
    tfidf::{ModelStatus, StatisticalClassifier, StatisticalSettings, TrainingReport},
};

/// Runs the classifier ensemble in priority order: remote, statistical, heuristic.
pub struct ClassificationService {
    remote: Option<Arc<dyn RemoteClassifier>>,
    statistical: Arc<StatisticalClassifier>,
    patterns: PatternDensityClassifier,
    keywords: Option<KeywordDomainClassifier>,
    extractor: Arc<dyn ArtifactText>,
}

impl ClassificationService {
    pub fn new(
        remote: Option<Arc<dyn RemoteClassifier>>,
        statistical: Arc<StatisticalClassifier>,
        patterns: PatternDensityClassifier,
        keywords: Option<KeywordDomainClassifier>,
        extractor: Arc<dyn ArtifactText>,
    ) -> Self {
        Self {
            remote,
            statistical,
            patterns,
            keywords,
            extractor,
        }
    }

    /// Builds every enabled classifier and restores a persisted model when one exists.
    ///
    /// A failing model load or an unreachable remote server is logged and otherwise ignored.
    pub async fn from_config(
        config: &AppConfig,
        storage: StorageManager,
        extractor: Arc<dyn ArtifactText>,
    ) -> Result<Self, AppError> {
        let statistical = Arc::new(StatisticalClassifier::new(
            StatisticalSettings::from_config(config),
            storage,
        ));
        match statistical.load().await {
            Ok(true) => info!("Statistical classifier ready"),
            Ok(false) => info!("Statistical classifier has no trained model yet"),
            Err(err) => warn!(error = %err, "Failed to load persisted model"),
        }

        let remote: Option<Arc<dyn RemoteClassifier>> = if config.mcp_enabled {
            let client = McpClient::from_config(config)?;
            if let Err(err) = client.ping().await {
                warn!(
                    endpoint = client.endpoint(),
                    error = %err,
                    "Remote classifier unreachable, classification continues without it"
                );
            }
            Some(Arc::new(client))
        } else {
            None
        };

        let keywords = config.rule_based_enabled.then(|| {
            KeywordDomainClassifier::new(
                &config.rule_categories,
                config.rule_based_confidence_threshold,
            )
        });

        Ok(Self::new(
            remote,
            statistical,
            PatternDensityClassifier::new()?,
            keywords,
            extractor,
        ))
    }

    pub fn statistical(&self) -> &StatisticalClassifier {
        &self.statistical
    }

    pub fn extractor(&self) -> Arc<dyn ArtifactText> {
        Arc::clone(&self.extractor)
    }

    /// Merged, de-duplicated assignments for `document`, highest confidence first.
    ///
    /// Never fails: a source that errors contributes nothing, and the pattern scorer always
    /// contributes one assignment.
    #[instrument(skip_all, fields(document_id = %document.id))]
    pub async fn classify(&self, document: &Document) -> Vec<CategoryAssignment> {
        let wants_text = self.remote.is_some()
            || (self.statistical.is_enabled() && self.statistical.is_trained().await);

        let fused = if wants_text {
            match self.extractor.artifact_text(document).await {
                Ok(text) => Some(fuse_text(document, &text)),
                Err(err) => {
                    warn!(error = %err, "Artifact text unavailable, using metadata classifiers only");
                    None
                }
            }
        } else {
            None
        };

        let mut sources: Vec<Vec<CategoryAssignment>> = Vec::with_capacity(4);

        if let Some(remote) = &self.remote {
            // Without the PDF text the remote side still gets title, description and meta tags.
            let content = fused.clone().unwrap_or_else(|| document.metadata_text());
            let request = RemoteClassificationRequest {
                document_id: &document.id,
                title: &document.title,
                description: &document.description,
                content: &content,
            };
            match remote.classify(request).await {
                Ok(assignments) => {
                    debug!(count = assignments.len(), "Remote classifier answered");
                    sources.push(assignments);
                }
                Err(err) => warn!(error = %err, "Remote classification failed, falling back"),
            }
        }

        if let Some(content) = fused.as_deref() {
            sources.push(self.statistical.classify_text(content).await);
        }

        sources.push(self.patterns.classify(document));

        if let Some(keywords) = &self.keywords {
            sources.push(keywords.classify(document));
        }

        let merged = merge_assignments(sources);
        debug!(count = merged.len(), "Classification merged");
        merged
    }

    pub async fn train(&self, documents: &[Document]) -> Result<TrainingReport, AppError> {
        self.statistical
            .train(documents, self.extractor.as_ref())
            .await
    }

    pub async fn model_status(&self) -> ModelStatus {
        self.statistical.status().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use async_trait::async_trait;
    use common::utils::config::RuleCategory;

    use super::*;
    use crate::{
        heuristic::{KEYWORD_CLASSIFIER_TAG, PATTERN_CLASSIFIER_TAG},
        tfidf::{TrainingParams, STATISTICAL_CLASSIFIER_TAG},
    };

    struct FixedText(HashMap<String, String>);

    #[async_trait]
    impl ArtifactText for FixedText {
        async fn artifact_text(&self, document: &Document) -> Result<String, AppError> {
            self.0
                .get(&document.id)
                .cloned()
                .ok_or_else(|| AppError::Extraction("unreadable".into()))
        }
    }

    struct StubRemote(Result<Vec<CategoryAssignment>, ()>);

    #[async_trait]
    impl RemoteClassifier for StubRemote {
        async fn classify(
            &self,
            _request: RemoteClassificationRequest<'_>,
        ) -> Result<Vec<CategoryAssignment>, AppError> {
            self.0
                .clone()
                .map_err(|()| AppError::Communication("offline".into()))
        }
    }

    /// Remembers the content of every request it answers.
    #[derive(Default)]
    struct RecordingRemote(tokio::sync::Mutex<Vec<String>>);

    #[async_trait]
    impl RemoteClassifier for RecordingRemote {
        async fn classify(
            &self,
            request: RemoteClassificationRequest<'_>,
        ) -> Result<Vec<CategoryAssignment>, AppError> {
            self.0.lock().await.push(request.content.to_string());
            Ok(vec![CategoryAssignment::new("Open Source", 0.9, "mcp-test")])
        }
    }

    fn statistical(enabled: bool) -> Arc<StatisticalClassifier> {
        Arc::new(StatisticalClassifier::new(
            StatisticalSettings {
                enabled,
                confidence_threshold: 0.6,
                model_location: "models/service-test.json".into(),
                params: TrainingParams::default(),
            },
            StorageManager::memory(),
        ))
    }

    fn service(
        remote: Option<Arc<dyn RemoteClassifier>>,
        statistical: Arc<StatisticalClassifier>,
        keywords: Option<KeywordDomainClassifier>,
        texts: HashMap<String, String>,
    ) -> ClassificationService {
        ClassificationService::new(
            remote,
            statistical,
            PatternDensityClassifier::new().expect("patterns"),
            keywords,
            Arc::new(FixedText(texts)),
        )
    }

    fn tech_document() -> Document {
        let mut doc = Document::new("https://github.com/rust-lang/rust");
        doc.title = "Rust programming language".into();
        doc.description = "A software developer framework".into();
        doc.pdf_attachment_name = Some("rust.pdf".into());
        doc
    }

    #[tokio::test]
    async fn heuristic_only_yields_single_assignment() {
        let svc = service(None, statistical(false), None, HashMap::new());
        let result = svc.classify(&tech_document()).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "Technology");
        assert_eq!(result[0].classifier, PATTERN_CLASSIFIER_TAG);
    }

    #[tokio::test]
    async fn remote_result_wins_over_lower_confidence_duplicates() {
        let doc = tech_document();
        let remote: Arc<dyn RemoteClassifier> = Arc::new(StubRemote(Ok(vec![
            CategoryAssignment::new("Technology", 1.0, "mcp-test"),
            CategoryAssignment::new("Open Source", 0.8, "mcp-test"),
        ])));
        let texts = HashMap::from([(doc.id.clone(), "compilers".to_string())]);
        let svc = service(Some(remote), statistical(false), None, texts);

        let result = svc.classify(&doc).await;
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].name, "Technology");
        assert_eq!(result[0].classifier, "mcp-test");
        assert_eq!(result[1].name, "Open Source");
    }

    #[tokio::test]
    async fn remote_gets_metadata_when_pdf_text_is_unreadable() {
        let doc = tech_document();
        let remote = Arc::new(RecordingRemote::default());
        let shared: Arc<dyn RemoteClassifier> = Arc::clone(&remote) as Arc<dyn RemoteClassifier>;
        let svc = service(Some(shared), statistical(false), None, HashMap::new());

        let result = svc.classify(&doc).await;
        assert_eq!(*remote.0.lock().await, vec![doc.metadata_text()]);
        assert!(result
            .iter()
            .any(|a| a.name == "Open Source" && a.classifier == "mcp-test"));
    }

    #[tokio::test]
    async fn failing_remote_falls_through() {
        let doc = tech_document();
        let remote: Arc<dyn RemoteClassifier> = Arc::new(StubRemote(Err(())));
        let texts = HashMap::from([(doc.id.clone(), "compilers".to_string())]);
        let svc = service(Some(remote), statistical(false), None, texts);

        let result = svc.classify(&doc).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].classifier, PATTERN_CLASSIFIER_TAG);
    }

    #[tokio::test]
    async fn trained_statistical_classifier_contributes() {
        let mut texts = HashMap::new();
        let mut training = Vec::new();
        for (category, text) in [
            ("Gardening", "compost soil seedlings tomato"),
            ("Gardening", "compost soil mulch tomato"),
            ("Astronomy", "telescope orbit planet nebula"),
            ("Astronomy", "telescope orbit planet comet"),
        ] {
            let mut doc = Document::new("https://example.com");
            doc.pdf_attachment_name = Some("a.pdf".into());
            doc.categories = vec![CategoryAssignment::new(category, 1.0, "manual")];
            texts.insert(doc.id.clone(), text.to_string());
            training.push(doc);
        }

        let mut target = Document::new("https://example.com/garden");
        target.pdf_attachment_name = Some("g.pdf".into());
        texts.insert(target.id.clone(), "compost soil tomato".to_string());

        let svc = service(None, statistical(true), None, texts);
        svc.train(&training).await.expect("train");

        let result = svc.classify(&target).await;
        let gardening = result
            .iter()
            .find(|a| a.name == "Gardening")
            .expect("statistical assignment");
        assert_eq!(gardening.classifier, STATISTICAL_CLASSIFIER_TAG);
        assert!(result.iter().any(|a| a.classifier == PATTERN_CLASSIFIER_TAG));
        assert!(svc.model_status().await.trained);
    }

    #[tokio::test]
    async fn keyword_scorer_joins_when_enabled() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "code hosting".to_string(),
            RuleCategory {
                keywords: vec!["rust".into()],
                domains: vec!["github.com".into()],
            },
        );
        let keywords = KeywordDomainClassifier::new(&rules, 0.7);
        let svc = service(None, statistical(false), Some(keywords), HashMap::new());

        let result = svc.classify(&tech_document()).await;
        assert!(result
            .iter()
            .any(|a| a.name == "code hosting" && a.classifier == KEYWORD_CLASSIFIER_TAG));
    }
}
