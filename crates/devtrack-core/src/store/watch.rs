//! In-process watch fan-out shared by the local store backends.

use tokio::sync::mpsc;

use super::{Document, FieldFilter, SnapshotReceiver, StoreError};

struct Watcher {
    collection: String,
    filter: Option<FieldFilter>,
    tx: mpsc::UnboundedSender<super::StoreResult<Vec<Document>>>,
}

/// Registered collection watches.
#[derive(Default)]
pub(super) struct WatchRegistry {
    watchers: Vec<Watcher>,
}

impl WatchRegistry {
    /// Register a watch and deliver the current snapshot immediately.
    pub(super) fn register(
        &mut self,
        collection: &str,
        filter: Option<FieldFilter>,
        current: &[Document],
    ) -> SnapshotReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(select(current, filter.as_ref())));
        self.watchers.push(Watcher {
            collection: collection.to_string(),
            filter,
            tx,
        });
        rx
    }

    /// Push a fresh snapshot to every open watch on `collection`.
    pub(super) fn notify(&mut self, collection: &str, current: &[Document]) {
        self.watchers.retain(|watcher| {
            if watcher.collection != collection {
                return !watcher.tx.is_closed();
            }
            watcher
                .tx
                .send(Ok(select(current, watcher.filter.as_ref())))
                .is_ok()
        });
    }

    /// Terminate every watch on `collection` with `error`.
    pub(super) fn fail(&mut self, collection: &str, error: &StoreError) {
        self.watchers.retain(|watcher| {
            if watcher.collection == collection {
                let _ = watcher.tx.send(Err(error.clone()));
                false
            } else {
                true
            }
        });
    }

    pub(super) fn active(&self, collection: &str) -> usize {
        self.watchers
            .iter()
            .filter(|watcher| watcher.collection == collection && !watcher.tx.is_closed())
            .count()
    }

    /// Distinct collections with at least one watch, in registration order.
    pub(super) fn collections(&self) -> Vec<String> {
        let mut collections: Vec<String> = Vec::new();
        for watcher in &self.watchers {
            if !collections.contains(&watcher.collection) {
                collections.push(watcher.collection.clone());
            }
        }
        collections
    }

    pub(super) fn has_watchers(&self, collection: &str) -> bool {
        self.watchers
            .iter()
            .any(|watcher| watcher.collection == collection)
    }
}

pub(super) fn select(documents: &[Document], filter: Option<&FieldFilter>) -> Vec<Document> {
    documents
        .iter()
        .filter(|document| filter.map_or(true, |filter| filter.matches(&document.fields)))
        .cloned()
        .collect()
}
