//! Document-store seam.
//!
//! The remote store is modelled as named collections of schema-less JSON
//! documents keyed by id, with equality queries and live collection watches.
//! Components receive a store handle explicitly; there is no global client.

mod memory;
mod sqlite;
mod watch;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::{MemoryStore, StoreCall};
pub use sqlite::SqliteStore;

/// Shared handle to a document store, passed explicitly to every component.
pub type SharedStore = std::sync::Arc<dyn DocumentStore>;

/// Document field map.
pub type Fields = serde_json::Map<String, Value>;

/// Receiving half of a collection watch. Each item is a complete snapshot of
/// every document currently matching the watch.
pub type SnapshotReceiver = mpsc::UnboundedReceiver<StoreResult<Vec<Document>>>;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a document store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Document does not exist (for updates and deletes).
    #[error("Document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// Store could not be reached or rejected the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend-specific failure.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Operation exceeded its configured deadline.
    #[error("Store operation timed out after {0} ms")]
    Timeout(u64),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Backend(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Backend(format!("invalid document JSON: {error}"))
    }
}

/// A raw document: id plus fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Equality predicate `field == value` used by queries and filtered watches.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether `fields` satisfies the predicate. Missing fields never match.
    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// Asynchronous document-store client.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Create or fully replace a document.
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    /// Merge `fields` into an existing document. Fails with
    /// [`StoreError::NotFound`] when the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    /// Delete a document.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Every document in the collection, in store order.
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Documents matching an equality predicate, in store order.
    async fn query_eq(&self, collection: &str, filter: &FieldFilter) -> StoreResult<Vec<Document>>;

    /// Watch a collection. The current snapshot is delivered first, then one
    /// snapshot per change batch. An `Err` item terminates the watch.
    async fn watch(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
    ) -> StoreResult<SnapshotReceiver>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn field_filter_requires_exact_value() {
        let mut fields = Fields::new();
        fields.insert("departmentName".to_string(), json!("Lab"));

        assert!(FieldFilter::equals("departmentName", "Lab").matches(&fields));
        assert!(!FieldFilter::equals("departmentName", "lab").matches(&fields));
        assert!(!FieldFilter::equals("department", "Lab").matches(&fields));
    }
}
