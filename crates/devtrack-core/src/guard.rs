//! Referential-integrity checks in front of department deletes.
//!
//! A department may only be deleted when no device and no user still refers
//! to it by name, and only after the operator confirmed. References are
//! checked with fresh store queries, never with cached view state.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::collections::{DEPARTMENTS, DEVICES, USERS};
use crate::models::Department;
use crate::store::{FieldFilter, SharedStore, StoreError};

/// Why a delete was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// At least one device is assigned to the department.
    HasDevices,
    /// At least one user belongs to the department.
    HasUsers,
}

/// Result of a delete request that reached a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Blocked(BlockReason),
    Cancelled,
}

impl DeleteOutcome {
    /// Message shown to the operator.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Deleted => "Department deleted.",
            Self::Blocked(BlockReason::HasDevices) => {
                "Cannot delete this department: devices are still assigned to it."
            }
            Self::Blocked(BlockReason::HasUsers) => {
                "Cannot delete this department: users still belong to it."
            }
            Self::Cancelled => "Delete cancelled.",
        }
    }
}

/// A delete request that failed on the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeleteError {
    /// A reference check failed. Nothing was mutated; retrying is safe.
    #[error("Reference check on {collection} failed: {source}")]
    Query {
        collection: &'static str,
        #[source]
        source: StoreError,
    },

    /// The delete itself failed. The department must not be assumed deleted.
    #[error("Delete of department {id} failed: {source}")]
    Delete {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl DeleteError {
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Query { .. } => {
                "Could not check whether the department is still in use. Nothing was deleted; try again."
            }
            Self::Delete { .. } => {
                "The department could not be deleted. It may still exist; refresh and try again."
            }
        }
    }
}

/// Asks the operator to approve a destructive action.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// `true` to proceed.
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Confirmer with a fixed answer, for non-interactive callers.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// Guards department deletes.
#[derive(Clone)]
pub struct DepartmentGuard {
    store: SharedStore,
}

impl DepartmentGuard {
    #[must_use]
    pub const fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Delete `target` if nothing refers to it and the operator confirms.
    ///
    /// Devices are checked before users, and the confirmation is only
    /// requested once both checks came back empty. At most one delete is
    /// issued.
    pub async fn request_delete(
        &self,
        target: &Department,
        confirmer: &dyn Confirmer,
    ) -> Result<DeleteOutcome, DeleteError> {
        if self.is_referenced(DEVICES, "departmentName", &target.name).await? {
            tracing::info!(department = %target.name, "Delete blocked: department has devices");
            return Ok(DeleteOutcome::Blocked(BlockReason::HasDevices));
        }

        if self.is_referenced(USERS, "department", &target.name).await? {
            tracing::info!(department = %target.name, "Delete blocked: department has users");
            return Ok(DeleteOutcome::Blocked(BlockReason::HasUsers));
        }

        let prompt = format!("Delete department \"{}\"?", target.name);
        if !confirmer.confirm(&prompt).await {
            tracing::debug!(department = %target.name, "Delete cancelled by operator");
            return Ok(DeleteOutcome::Cancelled);
        }

        self.store
            .delete(DEPARTMENTS, &target.id)
            .await
            .map_err(|source| {
                tracing::warn!(id = %target.id, error = %source, "Department delete failed");
                DeleteError::Delete {
                    id: target.id.clone(),
                    source,
                }
            })?;

        tracing::info!(id = %target.id, department = %target.name, "Department deleted");
        Ok(DeleteOutcome::Deleted)
    }

    async fn is_referenced(
        &self,
        collection: &'static str,
        field: &str,
        name: &str,
    ) -> Result<bool, DeleteError> {
        let filter = FieldFilter::equals(field, Value::String(name.to_string()));
        let matches = self
            .store
            .query_eq(collection, &filter)
            .await
            .map_err(|source| DeleteError::Query { collection, source })?;
        Ok(!matches.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::store::{Fields, MemoryStore, StoreCall};

    struct CountingConfirmer {
        answer: bool,
        asked: AtomicUsize,
    }

    impl CountingConfirmer {
        fn new(answer: bool) -> Self {
            Self {
                answer,
                asked: AtomicUsize::new(0),
            }
        }

        fn asked(&self) -> usize {
            self.asked.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Confirmer for CountingConfirmer {
        async fn confirm(&self, prompt: &str) -> bool {
            assert!(prompt.contains("Lab"));
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn setup() -> (MemoryStore, DepartmentGuard, Department) {
        let store = MemoryStore::new();
        store.seed(DEPARTMENTS, "d1", fields(json!({"name": "Lab"})));
        let guard = DepartmentGuard::new(Arc::new(store.clone()));
        (store, guard, Department::new("d1", "Lab"))
    }

    fn delete_calls(store: &MemoryStore) -> usize {
        store
            .calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::Delete { .. }))
            .count()
    }

    #[tokio::test]
    async fn blocks_when_devices_reference_department() {
        let (store, guard, lab) = setup();
        store.seed(
            DEVICES,
            "x",
            fields(json!({"name": "L", "type": "Laptop", "departmentName": "Lab"})),
        );
        store.seed(USERS, "u", fields(json!({"fullname": "An", "department": "Lab"})));
        let confirmer = CountingConfirmer::new(true);

        let outcome = guard.request_delete(&lab, &confirmer).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Blocked(BlockReason::HasDevices));
        assert_eq!(confirmer.asked(), 0);
        assert_eq!(delete_calls(&store), 0);
        // the user check never ran
        assert!(!store.calls().iter().any(|call| call.collection() == USERS));
    }

    #[tokio::test]
    async fn blocks_when_users_reference_department() {
        let (store, guard, lab) = setup();
        store.seed(USERS, "u", fields(json!({"fullname": "An", "department": "Lab"})));
        let confirmer = CountingConfirmer::new(true);

        let outcome = guard.request_delete(&lab, &confirmer).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Blocked(BlockReason::HasUsers));
        assert_eq!(confirmer.asked(), 0);
        assert_eq!(delete_calls(&store), 0);
        assert_eq!(store.count(DEPARTMENTS), 1);
    }

    #[tokio::test]
    async fn references_match_names_exactly() {
        let (store, guard, lab) = setup();
        store.seed(
            DEVICES,
            "x",
            fields(json!({"name": "L", "type": "Laptop", "departmentName": "Lab2"})),
        );
        store.seed(USERS, "u", fields(json!({"fullname": "An", "department": "lab"})));

        let outcome = guard.request_delete(&lab, &AutoConfirm(true)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn declined_confirmation_deletes_nothing() {
        let (store, guard, lab) = setup();
        let confirmer = CountingConfirmer::new(false);

        let outcome = guard.request_delete(&lab, &confirmer).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert_eq!(confirmer.asked(), 1);
        assert_eq!(delete_calls(&store), 0);
        assert_eq!(store.count(DEPARTMENTS), 1);
    }

    #[tokio::test]
    async fn confirmed_unreferenced_department_is_deleted_once() {
        let (store, guard, lab) = setup();
        let confirmer = CountingConfirmer::new(true);

        let outcome = guard.request_delete(&lab, &confirmer).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(delete_calls(&store), 1);
        assert_eq!(store.count(DEPARTMENTS), 0);
    }

    #[tokio::test]
    async fn query_failure_is_retryable_and_mutates_nothing() {
        let (store, guard, lab) = setup();
        store.fail_when(|call| {
            matches!(call, StoreCall::Query { .. })
                .then(|| StoreError::Unavailable("offline".to_string()))
        });
        let confirmer = CountingConfirmer::new(true);

        let err = guard.request_delete(&lab, &confirmer).await.unwrap_err();

        assert!(matches!(err, DeleteError::Query { collection: DEVICES, .. }));
        assert_eq!(confirmer.asked(), 0);
        assert_eq!(delete_calls(&store), 0);

        store.clear_faults();
        let outcome = guard.request_delete(&lab, &confirmer).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn delete_failure_is_reported() {
        let (store, guard, lab) = setup();
        store.fail_when(|call| {
            matches!(call, StoreCall::Delete { .. })
                .then(|| StoreError::Backend("permission denied".to_string()))
        });

        let err = guard.request_delete(&lab, &AutoConfirm(true)).await.unwrap_err();

        assert!(matches!(err, DeleteError::Delete { ref id, .. } if id == "d1"));
        assert_eq!(delete_calls(&store), 1);
        assert_eq!(store.count(DEPARTMENTS), 1);
    }

    #[test]
    fn every_outcome_has_distinct_message() {
        let source = StoreError::Unavailable("x".to_string());
        let messages = [
            DeleteOutcome::Deleted.user_message(),
            DeleteOutcome::Blocked(BlockReason::HasDevices).user_message(),
            DeleteOutcome::Blocked(BlockReason::HasUsers).user_message(),
            DeleteOutcome::Cancelled.user_message(),
            DeleteError::Query {
                collection: DEVICES,
                source: source.clone(),
            }
            .user_message(),
            DeleteError::Delete {
                id: "d1".to_string(),
                source,
            }
            .user_message(),
        ];
        let unique: std::collections::HashSet<_> = messages.iter().collect();
        assert_eq!(unique.len(), messages.len());
    }
}
