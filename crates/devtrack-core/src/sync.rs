//! Live change streams of typed record sets.
//!
//! [`subscribe`] wraps a store watch in a background task that decodes every
//! raw snapshot into a [`RecordSet`] and pushes it to the consumer. Each
//! emission replaces the previous one entirely. A failing watch produces one
//! terminal [`SyncError`]; resubscribing is the consumer's decision.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::models::{Record, RecordSet};
use crate::store::{FieldFilter, SharedStore, StoreError};

const CHANNEL_CAPACITY: usize = 16;

/// Terminal failure of a subscription.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The watch could not be opened or the store reported an error.
    #[error("Subscription to {collection} failed: {source}")]
    Store {
        collection: &'static str,
        #[source]
        source: StoreError,
    },

    /// The store closed the watch without an error.
    #[error("Subscription to {collection} ended unexpectedly")]
    Closed { collection: &'static str },
}

/// Idempotent canceller for a [`Subscription`]; cloneable so another task can
/// stop the stream.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    task: AbortHandle,
}

impl CancelHandle {
    /// Stop the subscription. Safe to call any number of times.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.task.abort();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A live stream of [`RecordSet`]s for one collection query.
///
/// Dropping the subscription cancels it.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<RecordSet<T>, SyncError>>,
    cancel: CancelHandle,
    finished: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Subscription<T> {
    /// Next full record set.
    ///
    /// Returns `Some(Err(_))` once when the stream fails, and `None` after
    /// that or after cancellation. Snapshots that were already buffered when
    /// the subscription got cancelled are discarded.
    pub async fn next(&mut self) -> Option<Result<RecordSet<T>, SyncError>> {
        if self.finished || self.cancel.is_cancelled() {
            return None;
        }

        let item = self.rx.recv().await;
        if self.cancel.is_cancelled() {
            return None;
        }

        match item {
            Some(Err(error)) => {
                self.finished = true;
                Some(Err(error))
            }
            None => {
                self.finished = true;
                None
            }
            emission => emission,
        }
    }

    /// Detach from the store. Idempotent.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    /// A handle that can cancel this subscription from elsewhere.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Subscribe to `T`'s collection, optionally pre-filtered by an equality predicate.
///
/// Must be called from within a tokio runtime. Returns immediately; the watch
/// is opened by the background task.
pub fn subscribe<T: Record>(store: &SharedStore, filter: Option<FieldFilter>) -> Subscription<T> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let store = Arc::clone(store);
    let collection = T::COLLECTION;

    let task = tokio::spawn(async move {
        let mut raw = match store.watch(collection, filter).await {
            Ok(raw) => raw,
            Err(source) => {
                tracing::warn!(collection, error = %source, "Failed to open collection watch");
                let _ = tx.send(Err(SyncError::Store { collection, source })).await;
                return;
            }
        };
        tracing::debug!(collection, "Collection watch opened");

        loop {
            let terminal = match raw.recv().await {
                Some(Ok(documents)) => {
                    let records = RecordSet::<T>::from_documents(&documents);
                    if tx.send(Ok(records)).await.is_err() {
                        return;
                    }
                    continue;
                }
                Some(Err(source)) => SyncError::Store { collection, source },
                None => SyncError::Closed { collection },
            };

            tracing::warn!(collection, error = %terminal, "Collection watch terminated");
            let _ = tx.send(Err(terminal)).await;
            return;
        }
    });

    Subscription {
        rx,
        cancel: CancelHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
            task: task.abort_handle(),
        },
        finished: false,
        _record: PhantomData,
    }
}
