use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// The fixed, linear sequence of ingestion steps.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStep {
    UrlVerification,
    PdfConversion,
    Storage,
    ContentAnalysis,
    Categorization,
    Completed,
}

impl ProcessingStep {
    pub const fn description(self) -> &'static str {
        match self {
            ProcessingStep::UrlVerification => "Verifying URL accessibility",
            ProcessingStep::PdfConversion => "Converting page to PDF",
            ProcessingStep::Storage => "Storing document and attachment",
            ProcessingStep::ContentAnalysis => "Analyzing content",
            ProcessingStep::Categorization => "Categorizing document",
            ProcessingStep::Completed => "Processing completed",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ProcessingStep::UrlVerification => "URL_VERIFICATION",
            ProcessingStep::PdfConversion => "PDF_CONVERSION",
            ProcessingStep::Storage => "STORAGE",
            ProcessingStep::ContentAnalysis => "CONTENT_ANALYSIS",
            ProcessingStep::Categorization => "CATEGORIZATION",
            ProcessingStep::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ProcessingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepResult {
    pub step: ProcessingStep,
    pub success: bool,
    pub message: String,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Progress of one ingestion. `completed` and `failed` are never both set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProcessingStatus {
    pub document_id: String,
    pub current_step: ProcessingStep,
    pub steps: Vec<StepResult>,
    pub completed: bool,
    pub failed: bool,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessingStatus {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            current_step: ProcessingStep::UrlVerification,
            steps: Vec::new(),
            completed: false,
            failed: false,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.completed || self.failed
    }

    pub fn begin(&mut self, step: ProcessingStep) {
        self.current_step = step;
    }

    pub fn record(
        &mut self,
        step: ProcessingStep,
        success: bool,
        message: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) {
        self.steps.push(StepResult {
            step,
            success,
            message: message.into(),
            completed_at: Utc::now(),
            payload,
        });
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.failed = true;
        self.error_message = Some(message.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.current_step = ProcessingStep::Completed;
        self.completed = true;
        self.finished_at = Some(Utc::now());
    }

    pub fn step(&self, step: ProcessingStep) -> Option<&StepResult> {
        self.steps.iter().find(|result| result.step == step)
    }

    fn expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let Some(finished) = self.finished_at else {
            return false;
        };
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(finished) >= ttl
    }
}

/// Shared handle to one in-flight status; only the ingestion that created it writes through it.
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<Mutex<ProcessingStatus>>);

impl StatusHandle {
    pub async fn begin(&self, step: ProcessingStep) {
        self.0.lock().await.begin(step);
    }

    pub async fn record(
        &self,
        step: ProcessingStep,
        success: bool,
        message: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) {
        self.0.lock().await.record(step, success, message, payload);
    }

    pub async fn fail(&self, message: impl Into<String>) {
        self.0.lock().await.fail(message);
    }

    pub async fn complete(&self) {
        self.0.lock().await.complete();
    }

    pub async fn snapshot(&self) -> ProcessingStatus {
        self.0.lock().await.clone()
    }
}

/// Concurrent map of document id to processing status.
///
/// Terminal statuses older than the configured TTL are evicted whenever a new one is created.
pub struct StatusTracker {
    entries: RwLock<HashMap<String, Arc<Mutex<ProcessingStatus>>>>,
    ttl: Duration,
}

impl StatusTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn create(&self, document_id: &str) -> StatusHandle {
        let status = Arc::new(Mutex::new(ProcessingStatus::new(document_id)));
        let mut entries = self.entries.write().await;
        self.evict_expired(&mut entries);
        entries.insert(document_id.to_string(), Arc::clone(&status));
        StatusHandle(status)
    }

    pub async fn get(&self, document_id: &str) -> Option<ProcessingStatus> {
        let entry = self.entries.read().await.get(document_id).map(Arc::clone)?;
        let snapshot = entry.lock().await.clone();
        Some(snapshot)
    }

    pub async fn remove(&self, document_id: &str) -> bool {
        self.entries.write().await.remove(document_id).is_some()
    }

    /// Ids of every tracked ingestion, in no particular order.
    pub async fn ids(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn evict_expired(&self, entries: &mut HashMap<String, Arc<Mutex<ProcessingStatus>>>) {
        let now = Utc::now();
        let before = entries.len();
        // Busy entries belong to running ingestions and are never expired.
        entries.retain(|_, status| {
            status
                .try_lock()
                .map_or(true, |status| !status.expired(now, self.ttl))
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired processing statuses");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_serialize_in_screaming_case() {
        let json = serde_json::to_string(&ProcessingStep::UrlVerification).expect("json");
        assert_eq!(json, "\"URL_VERIFICATION\"");
        assert_eq!(ProcessingStep::Categorization.to_string(), "CATEGORIZATION");
    }

    #[test]
    fn terminal_flags_are_exclusive() {
        let mut status = ProcessingStatus::new("doc");
        status.fail("boom");
        status.complete();
        assert!(status.failed);
        assert!(!status.completed);
        assert_eq!(status.error_message.as_deref(), Some("boom"));

        let mut status = ProcessingStatus::new("doc");
        status.complete();
        status.fail("late");
        assert!(status.completed);
        assert!(!status.failed);
        assert_eq!(status.current_step, ProcessingStep::Completed);
    }

    #[tokio::test]
    async fn create_get_remove() {
        let tracker = StatusTracker::new(Duration::from_secs(60));
        let handle = tracker.create("doc-1").await;
        handle
            .record(ProcessingStep::UrlVerification, true, "ok", None)
            .await;

        let status = tracker.get("doc-1").await.expect("tracked");
        assert_eq!(status.steps.len(), 1);
        assert!(tracker.get("doc-2").await.is_none());

        assert!(tracker.remove("doc-1").await);
        assert!(!tracker.remove("doc-1").await);
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn expired_terminal_statuses_are_evicted_on_create() {
        let tracker = StatusTracker::new(Duration::ZERO);
        tracker.create("finished").await.complete().await;
        let running = tracker.create("running").await;
        assert!(tracker.get("finished").await.is_none());

        tracker.create("another").await;
        assert!(tracker.get("running").await.is_some());
        running.complete().await;
        assert_eq!(tracker.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_ingestions_do_not_interfere() {
        let tracker = Arc::new(StatusTracker::new(Duration::from_secs(60)));
        let mut tasks = Vec::new();
        for i in 0..32 {
            let tracker = Arc::clone(&tracker);
            tasks.push(tokio::spawn(async move {
                let id = format!("doc-{i}");
                let handle = tracker.create(&id).await;
                handle
                    .record(ProcessingStep::UrlVerification, true, "ok", None)
                    .await;
                handle.complete().await;
                let status = tracker.get(&id).await.expect("present");
                assert!(status.completed);
                if i % 2 == 0 {
                    assert!(tracker.remove(&id).await);
                }
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }
        assert_eq!(tracker.len().await, 16);
    }
}
