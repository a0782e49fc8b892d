//! In-memory document store with live watches.
//!
//! Behaves like the remote store from the caller's point of view and records
//! every call, which makes it the backend of choice for tests. Faults can be
//! injected per call to exercise failure paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::watch::{select, WatchRegistry};
use super::{
    Document, DocumentStore, FieldFilter, Fields, SnapshotReceiver, StoreError, StoreResult,
};

/// A call made against a [`MemoryStore`], in the order it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get { collection: String, id: String },
    Set { collection: String, id: String },
    Update {
        collection: String,
        id: String,
        fields: Vec<String>,
    },
    Delete { collection: String, id: String },
    List { collection: String },
    Query {
        collection: String,
        field: String,
        value: String,
    },
    Watch { collection: String },
}

impl StoreCall {
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Get { collection, .. }
            | Self::Set { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. }
            | Self::List { collection }
            | Self::Query { collection, .. }
            | Self::Watch { collection } => collection,
        }
    }

    /// Whether this is an update touching `field`.
    #[must_use]
    pub fn updates_field(&self, field: &str) -> bool {
        matches!(self, Self::Update { fields, .. } if fields.iter().any(|name| name == field))
    }
}

type FaultFn = dyn Fn(&StoreCall) -> Option<StoreError> + Send + Sync;

#[derive(Default)]
struct Inner {
    collections: HashMap<String, IndexMap<String, Fields>>,
    watches: WatchRegistry,
    calls: Vec<StoreCall>,
    fault: Option<Arc<FaultFn>>,
    latency: Option<Duration>,
}

impl Inner {
    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notify(&mut self, collection: &str) {
        if self.watches.has_watchers(collection) {
            let current = self.snapshot(collection);
            self.watches.notify(collection, &current);
        }
    }
}

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document directly, notifying watchers. Not recorded as a call.
    pub fn seed(&self, collection: &str, id: &str, fields: Fields) {
        let mut inner = self.lock();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        inner.notify(collection);
    }

    /// Read a document directly. Not recorded as a call.
    #[must_use]
    pub fn document(&self, collection: &str, id: &str) -> Option<Fields> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id).cloned())
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.lock().collections.get(collection).map_or(0, IndexMap::len)
    }

    /// Fail every call for which `fault` returns an error. The call is still recorded.
    pub fn fail_when(
        &self,
        fault: impl Fn(&StoreCall) -> Option<StoreError> + Send + Sync + 'static,
    ) {
        self.lock().fault = Some(Arc::new(fault));
    }

    pub fn clear_faults(&self) {
        self.lock().fault = None;
    }

    /// Delay every call by `latency` before it is applied.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Terminate every open watch on `collection` with `error`.
    pub fn terminate_watches(&self, collection: &str, error: &StoreError) {
        self.lock().watches.fail(collection, error);
    }

    /// Number of open watches on `collection`.
    #[must_use]
    pub fn active_watches(&self, collection: &str) -> usize {
        self.lock().watches.active(collection)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn begin(&self, call: StoreCall) -> StoreResult<()> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        let fault = inner.fault.clone();
        let outcome = fault.and_then(|fault| fault(&call));
        inner.calls.push(call);
        outcome.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.begin(StoreCall::Get {
            collection: collection.to_string(),
            id: id.to_string(),
        })
        .await?;

        Ok(self
            .document(collection, id)
            .map(|fields| Document::new(id, fields)))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.begin(StoreCall::Set {
            collection: collection.to_string(),
            id: id.to_string(),
        })
        .await?;

        self.seed(collection, id, fields);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.begin(StoreCall::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields: fields.keys().cloned().collect(),
        })
        .await?;

        let mut inner = self.lock();
        let existing = inner
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        existing.extend(fields);
        inner.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.begin(StoreCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        })
        .await?;

        let mut inner = self.lock();
        let removed = inner
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.shift_remove(id));
        if removed.is_some() {
            inner.notify(collection);
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.begin(StoreCall::List {
            collection: collection.to_string(),
        })
        .await?;

        Ok(self.lock().snapshot(collection))
    }

    async fn query_eq(&self, collection: &str, filter: &FieldFilter) -> StoreResult<Vec<Document>> {
        self.begin(StoreCall::Query {
            collection: collection.to_string(),
            field: filter.field.clone(),
            value: filter.value.to_string(),
        })
        .await?;

        let current = self.lock().snapshot(collection);
        Ok(select(&current, Some(filter)))
    }

    async fn watch(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
    ) -> StoreResult<SnapshotReceiver> {
        self.begin(StoreCall::Watch {
            collection: collection.to_string(),
        })
        .await?;

        let mut inner = self.lock();
        let current = inner.snapshot(collection);
        Ok(inner.watches.register(collection, filter, &current))
    }
}
