//! Presentation views derived from live record sets.
//!
//! Projections are pure functions of the latest [`RecordSet`]; nothing is
//! carried over from one emission to the next. [`LiveView`] runs a projection
//! against a subscription and publishes each result as one immutable snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{Department, Device, ErrorRecord, Record, RecordSet, User};
use crate::store::{FieldFilter, SharedStore};
use crate::sync::{subscribe, Subscription, SyncError};
use crate::util::contains_ignore_case;

/// Records grouped by key. Groups keep first-appearance order, records keep
/// store order within a group.
pub type Groups<T> = IndexMap<String, Vec<T>>;

/// Departments in store order.
#[must_use]
pub fn department_list(departments: &RecordSet<Department>) -> Vec<Department> {
    departments.records().to_vec()
}

/// Group records by a key projection.
pub fn group_by<T, F>(records: &[T], key: F) -> Groups<T>
where
    T: Clone,
    F: Fn(&T) -> &str,
{
    let mut groups = Groups::new();
    for record in records {
        groups
            .entry(key(record).to_string())
            .or_insert_with(Vec::new)
            .push(record.clone());
    }
    groups
}

#[must_use]
pub fn devices_by_type(devices: &RecordSet<Device>) -> Groups<Device> {
    group_by(devices.records(), |device| device.kind.as_str())
}

#[must_use]
pub fn devices_by_department(devices: &RecordSet<Device>) -> Groups<Device> {
    group_by(devices.records(), |device| device.department_name.as_str())
}

#[must_use]
pub fn devices_by_assignee(devices: &RecordSet<Device>) -> Groups<Device> {
    group_by(devices.records(), |device| device.user.as_str())
}

#[must_use]
pub fn errors_by_device(errors: &RecordSet<ErrorRecord>) -> Groups<ErrorRecord> {
    group_by(errors.records(), |error| error.device_name.as_str())
}

/// Department names for a picker, in store order.
#[must_use]
pub fn department_options(departments: &RecordSet<Department>) -> Vec<String> {
    departments
        .iter()
        .map(|department| department.name.clone())
        .collect()
}

/// User full names for a picker, in store order.
#[must_use]
pub fn user_options(users: &RecordSet<User>) -> Vec<String> {
    users.iter().map(|user| user.fullname.clone()).collect()
}

/// Text fields a record can be found by.
pub trait Searchable {
    fn search_fields(&self) -> Vec<&str>;
}

impl Searchable for Department {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str()]
    }
}

impl Searchable for Device {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.name.as_str(),
            self.kind.as_str(),
            self.department_name.as_str(),
            self.user.as_str(),
            self.note.as_str(),
        ];
        fields.extend(self.specifications.values().map(String::as_str));
        fields
    }
}

impl Searchable for User {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.fullname.as_str(), self.department.as_str()]
    }
}

impl Searchable for ErrorRecord {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.device_name.as_str()]
    }
}

/// Keep records with any searchable field containing `query` (case-insensitive).
/// A blank query keeps everything.
pub fn filter_records<T: Searchable + Clone>(records: &[T], query: &str) -> Vec<T> {
    records
        .iter()
        .filter(|record| {
            record
                .search_fields()
                .iter()
                .any(|field| contains_ignore_case(field, query))
        })
        .cloned()
        .collect()
}

/// Latest state of a live view.
#[derive(Debug)]
pub enum ViewState<V> {
    /// No snapshot received yet.
    Pending,
    /// Latest projection.
    Ready(Arc<V>),
    /// The underlying subscription failed; the view no longer updates.
    Failed(SyncError),
}

impl<V> Clone for ViewState<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Pending => Self::Pending,
            Self::Ready(view) => Self::Ready(Arc::clone(view)),
            Self::Failed(error) => Self::Failed(error.clone()),
        }
    }
}

impl<V> ViewState<V> {
    /// The projection, when one is available.
    #[must_use]
    pub fn ready(&self) -> Option<&Arc<V>> {
        match self {
            Self::Ready(view) => Some(view),
            _ => None,
        }
    }
}

/// A projection kept current by a background task.
pub struct LiveView<V> {
    rx: watch::Receiver<ViewState<V>>,
    cancelled: Arc<AtomicBool>,
    subscription: crate::sync::CancelHandle,
    task: JoinHandle<()>,
}

impl<V: Send + Sync + 'static> LiveView<V> {
    /// Drive `subscription` through `project`, replacing the published
    /// snapshot on every emission.
    pub fn spawn<T, F>(mut subscription: Subscription<T>, project: F) -> Self
    where
        T: Record,
        F: Fn(&RecordSet<T>) -> V + Send + 'static,
    {
        let (tx, rx) = watch::channel(ViewState::Pending);
        let handle = subscription.cancel_handle();

        let task = tokio::spawn(async move {
            while let Some(emission) = subscription.next().await {
                match emission {
                    Ok(records) => {
                        tx.send_replace(ViewState::Ready(Arc::new(project(&records))));
                    }
                    Err(error) => {
                        tx.send_replace(ViewState::Failed(error));
                        break;
                    }
                }
            }
        });

        Self {
            rx,
            cancelled: Arc::new(AtomicBool::new(false)),
            subscription: handle,
            task,
        }
    }

    /// Current snapshot without waiting.
    #[must_use]
    pub fn current(&self) -> ViewState<V> {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the view stopped or was cancelled.
    pub async fn changed(&mut self) -> Option<ViewState<V>> {
        if self.is_cancelled() {
            return None;
        }
        let changed = self.rx.changed().await;
        if self.is_cancelled() || changed.is_err() {
            return None;
        }
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until a snapshot (or failure) is available and return it.
    pub async fn ready(&mut self) -> Option<ViewState<V>> {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if !matches!(current, ViewState::Pending) {
                return Some(current);
            }
            self.changed().await?;
        }
    }

    /// Stop updating. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.subscription.cancel();
            self.task.abort();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<V> Drop for LiveView<V> {
    fn drop(&mut self) {
        self.subscription.cancel();
        self.task.abort();
    }
}

/// Live department list.
pub fn departments_view(store: &SharedStore) -> LiveView<Vec<Department>> {
    LiveView::spawn(subscribe::<Department>(store, None), department_list)
}

/// Live devices of one department, grouped by type.
pub fn department_devices_view(
    store: &SharedStore,
    department_name: &str,
) -> LiveView<Groups<Device>> {
    let filter = FieldFilter::equals("departmentName", department_name);
    LiveView::spawn(subscribe::<Device>(store, Some(filter)), devices_by_type)
}
