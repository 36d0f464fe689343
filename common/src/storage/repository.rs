use std::{future::Future, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, warn};

use crate::error::AppError;

use super::{
    db::SurrealDbClient,
    store::StorageManager,
    types::{
        category::{default_description, Category},
        document::Document,
        StoredObject,
    },
};

const CONFLICT_RETRIES: usize = 10;

/// Persistence for documents and their binary attachments.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save(&self, document: &Document) -> Result<Document, AppError>;
    async fn get(&self, id: &str) -> Result<Document, AppError>;
    /// Newest first.
    async fn list(&self, limit: usize) -> Result<Vec<Document>, AppError>;
    /// Removes the record and every attachment stored below it.
    async fn delete(&self, id: &str) -> Result<Document, AppError>;
    async fn exists(&self, id: &str) -> Result<bool, AppError>;
    async fn save_attachment(
        &self,
        id: &str,
        name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), AppError>;
    async fn get_attachment(&self, id: &str, name: &str) -> Result<Bytes, AppError>;
    async fn delete_attachment(&self, id: &str, name: &str) -> Result<(), AppError>;
}

/// Category records with per-category document counters.
#[async_trait]
pub trait CategoryCatalog: Send + Sync {
    async fn save(&self, category: &Category) -> Result<Category, AppError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<Category>, AppError>;
    async fn list(&self) -> Result<Vec<Category>, AppError>;
    async fn delete(&self, name: &str) -> Result<Category, AppError>;
    async fn increment_count(&self, name: &str) -> Result<Category, AppError>;
    /// Never drops below zero.
    async fn decrement_count(&self, name: &str) -> Result<Category, AppError>;

    /// Creates the category with a count of one, or bumps the counter when it already exists.
    ///
    /// Must be atomic: concurrent ingestions assigning the same category each add one.
    async fn ensure_category(&self, name: &str) -> Result<Category, AppError>;
}

fn conflict_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(5)
        .max_delay(Duration::from_millis(500))
        .map(jitter)
        .take(CONFLICT_RETRIES)
}

/// Replays `write` while SurrealDB reports a transaction conflict.
async fn retry_on_conflict<T, F, Fut>(write: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    RetryIf::spawn(conflict_backoff(), write, |err: &AppError| {
        let retry = err.is_retryable_conflict();
        if retry {
            warn!("Transient SurrealDB conflict; retrying");
        }
        retry
    })
    .await
}

fn attachment_prefix(id: &str) -> String {
    format!("documents/{id}")
}

fn attachment_location(id: &str, name: &str) -> String {
    format!("documents/{id}/{name}")
}

#[derive(Clone)]
pub struct SurrealDocumentStore {
    db: SurrealDbClient,
    storage: StorageManager,
}

impl SurrealDocumentStore {
    pub fn new(db: SurrealDbClient, storage: StorageManager) -> Self {
        Self { db, storage }
    }

    async fn require(&self, id: &str) -> Result<(), AppError> {
        if self.exists(id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("document {id}")))
        }
    }
}

#[async_trait]
impl DocumentStore for SurrealDocumentStore {
    async fn save(&self, document: &Document) -> Result<Document, AppError> {
        retry_on_conflict(|| async move {
            let mut record = document.clone();
            record.updated_at = Utc::now();
            self.db.upsert_item(record).await?.ok_or_else(|| {
                AppError::InternalError(format!("document {} was not saved", document.id))
            })
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Document, AppError> {
        self.db
            .get_item::<Document>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document {id}")))
    }

    async fn list(&self, limit: usize) -> Result<Vec<Document>, AppError> {
        Ok(self.db.get_recent_items::<Document>(limit).await?)
    }

    async fn delete(&self, id: &str) -> Result<Document, AppError> {
        let removed = self
            .db
            .delete_item::<Document>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document {id}")))?;
        self.storage.delete_prefix(&attachment_prefix(id)).await?;
        debug!(document_id = %id, "Deleted document and attachments");
        Ok(removed)
    }

    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.db.get_item::<Document>(id).await?.is_some())
    }

    async fn save_attachment(
        &self,
        id: &str,
        name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), AppError> {
        if name.is_empty() || name.contains('/') {
            return Err(AppError::Validation(format!(
                "invalid attachment name '{name}'"
            )));
        }
        self.require(id).await?;
        let size = bytes.len();
        self.storage
            .put(&attachment_location(id, name), bytes)
            .await?;
        debug!(document_id = %id, attachment = %name, content_type, size, "Stored attachment");
        Ok(())
    }

    async fn get_attachment(&self, id: &str, name: &str) -> Result<Bytes, AppError> {
        self.storage
            .get(&attachment_location(id, name))
            .await
            .map_err(|err| match err {
                object_store::Error::NotFound { .. } => {
                    AppError::NotFound(format!("attachment {name} of document {id}"))
                }
                other => AppError::ObjectStore(other),
            })
    }

    async fn delete_attachment(&self, id: &str, name: &str) -> Result<(), AppError> {
        let location = attachment_location(id, name);
        if !self.storage.exists(&location).await? {
            return Err(AppError::NotFound(format!(
                "attachment {name} of document {id}"
            )));
        }
        self.storage.delete(&location).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SurrealCategoryCatalog {
    db: SurrealDbClient,
}

impl SurrealCategoryCatalog {
    pub fn new(db: SurrealDbClient) -> Self {
        Self { db }
    }

    /// Runs a single-statement counter write against the record keyed by `name`.
    async fn update_count(&self, name: &str, query: &str) -> Result<Category, AppError> {
        retry_on_conflict(|| async move {
            let mut response = self
                .db
                .query(query)
                .bind(("table", Category::table_name()))
                .bind(("name", name.to_owned()))
                .bind(("description", default_description(name)))
                .await?;
            let updated: Option<Category> = response.take(0)?;
            updated.ok_or_else(|| AppError::NotFound(format!("category {name}")))
        })
        .await
    }
}

#[async_trait]
impl CategoryCatalog for SurrealCategoryCatalog {
    async fn save(&self, category: &Category) -> Result<Category, AppError> {
        retry_on_conflict(|| async move {
            let mut record = category.clone();
            record.updated_at = Utc::now();
            self.db.upsert_item(record).await?.ok_or_else(|| {
                AppError::InternalError(format!("category {} was not saved", category.name))
            })
        })
        .await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>, AppError> {
        Ok(self.db.get_item::<Category>(name).await?)
    }

    async fn list(&self) -> Result<Vec<Category>, AppError> {
        let mut categories = self.db.get_all_stored_items::<Category>().await?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn delete(&self, name: &str) -> Result<Category, AppError> {
        self.db
            .delete_item::<Category>(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("category {name}")))
    }

    async fn increment_count(&self, name: &str) -> Result<Category, AppError> {
        self.update_count(
            name,
            "UPDATE type::thing($table, $name) SET document_count += 1, updated_at = time::now()",
        )
        .await
    }

    async fn decrement_count(&self, name: &str) -> Result<Category, AppError> {
        self.update_count(
            name,
            "UPDATE type::thing($table, $name) SET document_count = math::max([document_count - 1, 0]), updated_at = time::now()",
        )
        .await
    }

    async fn ensure_category(&self, name: &str) -> Result<Category, AppError> {
        let category = self
            .update_count(
                name,
                "UPSERT type::thing($table, $name) SET name = $name, \
                 description = description OR $description, \
                 document_count = (document_count OR 0) + 1, \
                 created_at = created_at OR time::now(), updated_at = time::now()",
            )
            .await?;
        debug!(category = %name, count = category.document_count, "Category counted");
        Ok(category)
    }
}
