//! Frequency statistics over live collections.
//!
//! Four charts are derived from the users, devices and error reports:
//! users per department, devices per department, devices per assignee and
//! errors per device. Every chart is recomputed in full from the latest
//! record sets whenever one of them (or the filter text) changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{Device, ErrorRecord, RecordSet, User};
use crate::store::SharedStore;
use crate::sync::{subscribe, SyncError};
use crate::util::contains_ignore_case;
use crate::views::ViewState;

/// One bar of a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramEntry {
    pub key: String,
    pub count: usize,
}

/// Occurrence counts per key, in first-appearance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    counts: IndexMap<String, usize>,
}

impl Histogram {
    /// Count records by `key`. Records with an empty key are counted under `""`.
    pub fn count_by<T, F>(records: &[T], key: F) -> Self
    where
        F: Fn(&T) -> &str,
    {
        let mut counts = IndexMap::new();
        for record in records {
            *counts.entry(key(record).to_string()).or_insert(0) += 1;
        }
        Self { counts }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Entries whose key contains `filter` (case-insensitive), largest count
    /// first. Equal counts keep first-appearance order.
    #[must_use]
    pub fn view(&self, filter: &str) -> Vec<HistogramEntry> {
        let mut entries: Vec<_> = self
            .counts
            .iter()
            .filter(|(key, _)| contains_ignore_case(key, filter))
            .map(|(key, count)| HistogramEntry {
                key: key.clone(),
                count: *count,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries
    }
}

/// All charts for one filter text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub filter: String,
    pub users_by_department: Vec<HistogramEntry>,
    pub devices_by_department: Vec<HistogramEntry>,
    pub devices_by_user: Vec<HistogramEntry>,
    pub errors_by_device: Vec<HistogramEntry>,
}

impl Statistics {
    #[must_use]
    pub fn compute(
        users: &RecordSet<User>,
        devices: &RecordSet<Device>,
        errors: &RecordSet<ErrorRecord>,
        filter: &str,
    ) -> Self {
        let users = users.records();
        let devices = devices.records();
        Self {
            filter: filter.to_string(),
            users_by_department: Histogram::count_by(users, |user| user.department.as_str())
                .view(filter),
            devices_by_department: Histogram::count_by(devices, |device| {
                device.department_name.as_str()
            })
            .view(filter),
            devices_by_user: Histogram::count_by(devices, |device| device.user.as_str())
                .view(filter),
            errors_by_device: Histogram::count_by(errors.records(), |error| {
                error.device_name.as_str()
            })
            .view(filter),
        }
    }
}

/// Statistics kept current from three live subscriptions.
///
/// Stays [`ViewState::Pending`] until every collection delivered its first
/// snapshot. A failure of any subscription stops all updates.
pub struct LiveStatistics {
    rx: watch::Receiver<ViewState<Statistics>>,
    filter: watch::Sender<String>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LiveStatistics {
    /// Subscribe to users, devices and error reports. Must be called inside a
    /// tokio runtime.
    pub fn spawn(store: &SharedStore, filter: impl Into<String>) -> Self {
        let (tx, rx) = watch::channel(ViewState::Pending);
        let (filter_tx, mut filter_rx) = watch::channel(filter.into());

        let mut users = subscribe::<User>(store, None);
        let mut devices = subscribe::<Device>(store, None);
        let mut errors = subscribe::<ErrorRecord>(store, None);

        let task = tokio::spawn(async move {
            let mut latest_users = None;
            let mut latest_devices = None;
            let mut latest_errors = None;

            loop {
                let outcome = tokio::select! {
                    item = users.next() => absorb(&mut latest_users, item),
                    item = devices.next() => absorb(&mut latest_devices, item),
                    item = errors.next() => absorb(&mut latest_errors, item),
                    changed = filter_rx.changed() => changed.map_err(|_| None),
                };

                if let Err(failure) = outcome {
                    if let Some(error) = failure {
                        tracing::warn!(error = %error, "Statistics stopped updating");
                        tx.send_replace(ViewState::Failed(error));
                    }
                    break;
                }

                if let (Some(users), Some(devices), Some(errors)) =
                    (&latest_users, &latest_devices, &latest_errors)
                {
                    let filter = filter_rx.borrow_and_update().clone();
                    let statistics = Statistics::compute(users, devices, errors, &filter);
                    tx.send_replace(ViewState::Ready(Arc::new(statistics)));
                }
            }
        });

        Self {
            rx,
            filter: filter_tx,
            cancelled: Arc::new(AtomicBool::new(false)),
            task,
        }
    }

    /// Replace the key filter; the charts are recomputed.
    pub fn set_filter(&self, filter: impl Into<String>) {
        self.filter.send_replace(filter.into());
    }

    #[must_use]
    pub fn current(&self) -> ViewState<Statistics> {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once stopped or cancelled.
    pub async fn changed(&mut self) -> Option<ViewState<Statistics>> {
        if self.is_cancelled() || self.rx.changed().await.is_err() || self.is_cancelled() {
            return None;
        }
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the first snapshot (or failure) is available.
    pub async fn ready(&mut self) -> Option<ViewState<Statistics>> {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if !matches!(current, ViewState::Pending) {
                return Some(current);
            }
            self.changed().await?;
        }
    }

    /// Stop all three subscriptions. Idempotent.
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

impl Drop for LiveStatistics {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn absorb<T>(
    slot: &mut Option<RecordSet<T>>,
    item: Option<Result<RecordSet<T>, SyncError>>,
) -> Result<(), Option<SyncError>> {
    match item {
        Some(Ok(records)) => {
            *slot = Some(records);
            Ok(())
        }
        Some(Err(error)) => Err(Some(error)),
        None => Err(None),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::models::collections::{DEVICES, ERRORS, USERS};
    use crate::store::{Fields, MemoryStore, StoreError};

    fn entry(key: &str, count: usize) -> HistogramEntry {
        HistogramEntry {
            key: key.to_string(),
            count,
        }
    }

    fn users(departments: &[&str]) -> RecordSet<User> {
        RecordSet::new(
            departments
                .iter()
                .enumerate()
                .map(|(index, department)| User::new(index.to_string(), "U", *department))
                .collect(),
        )
    }

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn counts_and_filters_case_insensitively() {
        let set = users(&["A", "B", "A"]);
        let histogram = Histogram::count_by(set.records(), |user| user.department.as_str());

        assert_eq!(histogram.view(""), vec![entry("A", 2), entry("B", 1)]);
        assert_eq!(histogram.view("a"), vec![entry("A", 2)]);
        assert_eq!(histogram.total(), 3);
    }

    #[test]
    fn sorts_by_count_with_stable_ties() {
        let set = users(&["Ops", "Lab", "HR", "Lab", "Ops", "Lab"]);
        let histogram = Histogram::count_by(set.records(), |user| user.department.as_str());
        assert_eq!(
            histogram.view(""),
            vec![entry("Lab", 3), entry("Ops", 2), entry("HR", 1)]
        );

        let ties = users(&["B", "A", "C"]);
        let histogram = Histogram::count_by(ties.records(), |user| user.department.as_str());
        assert_eq!(
            histogram.view(" "),
            vec![entry("B", 1), entry("A", 1), entry("C", 1)]
        );
    }

    #[test]
    fn missing_keys_count_under_empty_string() {
        let devices = RecordSet::new(vec![
            Device::new("1", "L", "Laptop", "Lab"),
            Device::new("2", "P", "Printer", "Lab"),
        ]);
        let histogram = Histogram::count_by(devices.records(), |device| device.user.as_str());
        assert_eq!(histogram.get(""), 2);
    }

    #[test]
    fn computes_all_four_charts() {
        let mut laptop = Device::new("1", "Laptop 1", "Laptop", "Lab");
        laptop.user = "An".to_string();
        let printer = Device::new("2", "Printer", "Printer", "Ops");
        let devices = RecordSet::new(vec![laptop, printer]);
        let errors = RecordSet::new(vec![
            ErrorRecord::new("e1", "Printer"),
            ErrorRecord::new("e2", "Printer"),
            ErrorRecord::new("e3", "Laptop 1"),
        ]);

        let stats = Statistics::compute(&users(&["Lab"]), &devices, &errors, "");
        assert_eq!(stats.users_by_department, vec![entry("Lab", 1)]);
        assert_eq!(stats.devices_by_department, vec![entry("Lab", 1), entry("Ops", 1)]);
        assert_eq!(stats.devices_by_user, vec![entry("An", 1), entry("", 1)]);
        assert_eq!(stats.errors_by_device, vec![entry("Printer", 2), entry("Laptop 1", 1)]);

        let filtered = Statistics::compute(&users(&["Lab"]), &devices, &errors, "print");
        assert!(filtered.users_by_department.is_empty());
        assert_eq!(filtered.errors_by_device, vec![entry("Printer", 2)]);
    }

    #[tokio::test]
    async fn live_statistics_follow_changes_and_filter() {
        let store = MemoryStore::new();
        store.seed(USERS, "u1", fields(json!({"fullname": "An", "department": "A"})));
        store.seed(USERS, "u2", fields(json!({"fullname": "Binh", "department": "B"})));
        store.seed(
            DEVICES,
            "d1",
            fields(json!({"name": "L", "type": "Laptop", "departmentName": "A"})),
        );
        let shared: SharedStore = Arc::new(store.clone());

        let mut live = LiveStatistics::spawn(&shared, "");
        let first = live.ready().await.unwrap();
        let first = first.ready().unwrap();
        assert_eq!(first.users_by_department, vec![entry("A", 1), entry("B", 1)]);
        assert!(first.errors_by_device.is_empty());

        store.seed(USERS, "u3", fields(json!({"fullname": "Chi", "department": "A"})));
        let updated = loop {
            let state = live.changed().await.unwrap();
            let stats = Arc::clone(state.ready().unwrap());
            if stats.users_by_department.first() == Some(&entry("A", 2)) {
                break stats;
            }
        };
        assert_eq!(updated.users_by_department, vec![entry("A", 2), entry("B", 1)]);

        live.set_filter("a");
        let filtered = loop {
            let state = live.changed().await.unwrap();
            let stats = Arc::clone(state.ready().unwrap());
            if stats.filter == "a" {
                break stats;
            }
        };
        assert_eq!(filtered.users_by_department, vec![entry("A", 2)]);
    }

    #[tokio::test]
    async fn live_statistics_stop_on_subscription_failure() {
        let store = MemoryStore::new();
        let shared: SharedStore = Arc::new(store.clone());
        let mut live = LiveStatistics::spawn(&shared, "");
        assert!(live.ready().await.unwrap().ready().is_some());

        store.terminate_watches(ERRORS, &StoreError::Unavailable("gone".to_string()));
        let state = live.changed().await.unwrap();
        assert!(matches!(state, ViewState::Failed(SyncError::Store { collection: ERRORS, .. })));
        assert!(live.changed().await.is_none());
    }
}
