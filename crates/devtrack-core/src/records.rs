//! Record creation and one-shot reads.
//!
//! Everything here talks to the store directly. Live reads go through
//! [`crate::sync`] instead.

use serde_json::Value;

use crate::models::collections::DEPARTMENTS;
use crate::models::{new_record_id, Department, Device, ErrorRecord, Record, RecordSet, User};
use crate::store::{FieldFilter, Fields, SharedStore};
use crate::util::normalize_text_option;
use crate::{Error, Result};

/// Write `record` under its own id, replacing any existing document.
pub async fn insert<T: Record>(store: &SharedStore, record: &T) -> Result<()> {
    if record.id().trim().is_empty() {
        return Err(Error::InvalidInput("Record id cannot be empty".to_string()));
    }
    let fields = record.to_fields()?;
    store.set(T::COLLECTION, record.id(), fields).await?;
    Ok(())
}

/// Current contents of `T`'s collection.
pub async fn fetch_all<T: Record>(store: &SharedStore) -> Result<RecordSet<T>> {
    let documents = store.list(T::COLLECTION).await?;
    Ok(RecordSet::from_documents(&documents))
}

pub async fn fetch<T: Record>(store: &SharedStore, id: &str) -> Result<Option<T>> {
    match store.get(T::COLLECTION, id).await? {
        Some(document) => Ok(Some(T::from_document(&document)?)),
        None => Ok(None),
    }
}

/// Department lookup by its (unique) name.
pub async fn find_department(store: &SharedStore, name: &str) -> Result<Option<Department>> {
    let filter = FieldFilter::equals("name", Value::String(name.to_string()));
    let documents = store.query_eq(DEPARTMENTS, &filter).await?;
    Ok(RecordSet::<Department>::from_documents(&documents)
        .into_records()
        .into_iter()
        .next())
}

/// Create a department. Names are references elsewhere, so they must be unique.
pub async fn add_department(store: &SharedStore, name: &str) -> Result<Department> {
    let name = required(name, "Department name")?;
    if find_department(store, &name).await?.is_some() {
        return Err(Error::InvalidInput(format!(
            "Department \"{name}\" already exists"
        )));
    }

    let department = Department::new(new_record_id(), name);
    insert(store, &department).await?;
    tracing::info!(id = %department.id, name = %department.name, "Department created");
    Ok(department)
}

/// Create a device in an existing department.
pub async fn add_device(
    store: &SharedStore,
    name: &str,
    kind: &str,
    department_name: &str,
) -> Result<Device> {
    let name = required(name, "Device name")?;
    let kind = required(kind, "Device type")?;
    let department_name = required(department_name, "Department")?;
    ensure_department(store, &department_name).await?;

    let device = Device::new(new_record_id(), name, kind, department_name);
    insert(store, &device).await?;
    tracing::info!(id = %device.id, name = %device.name, "Device created");
    Ok(device)
}

/// Create a user in an existing department.
pub async fn add_user(store: &SharedStore, fullname: &str, department: &str) -> Result<User> {
    let fullname = required(fullname, "Full name")?;
    let department = required(department, "Department")?;
    ensure_department(store, &department).await?;

    let user = User::new(new_record_id(), fullname, department);
    insert(store, &user).await?;
    tracing::info!(id = %user.id, "User created");
    Ok(user)
}

/// Record an error report against a device name.
pub async fn add_error(
    store: &SharedStore,
    device_name: &str,
    details: Fields,
) -> Result<ErrorRecord> {
    let device_name = required(device_name, "Device name")?;
    let mut record = ErrorRecord::new(new_record_id(), device_name);
    record.details = details;
    record.details.remove("id");
    record.details.remove("deviceName");

    insert(store, &record).await?;
    tracing::debug!(id = %record.id, device = %record.device_name, "Error report recorded");
    Ok(record)
}

async fn ensure_department(store: &SharedStore, name: &str) -> Result<()> {
    if find_department(store, name).await?.is_none() {
        return Err(Error::NotFound(format!("Department \"{name}\"")));
    }
    Ok(())
}

fn required(value: &str, label: &str) -> Result<String> {
    normalize_text_option(Some(value.to_string()))
        .ok_or_else(|| Error::InvalidInput(format!("{label} cannot be empty")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::models::collections::{DEVICES, ERRORS, USERS};
    use crate::store::MemoryStore;

    fn setup() -> (MemoryStore, SharedStore) {
        let store = MemoryStore::new();
        let shared: SharedStore = Arc::new(store.clone());
        (store, shared)
    }

    #[tokio::test]
    async fn creates_department_once_per_name() {
        let (store, shared) = setup();

        let lab = add_department(&shared, "  Lab ").await.unwrap();
        assert_eq!(lab.name, "Lab");
        let stored = store.document(DEPARTMENTS, &lab.id).unwrap();
        assert_eq!(stored.get("name"), Some(&json!("Lab")));
        assert!(!stored.contains_key("id"));

        assert!(matches!(add_department(&shared, "Lab").await, Err(Error::InvalidInput(_))));
        assert!(matches!(add_department(&shared, " ").await, Err(Error::InvalidInput(_))));
        assert_eq!(store.count(DEPARTMENTS), 1);
    }

    #[tokio::test]
    async fn devices_and_users_need_an_existing_department() {
        let (store, shared) = setup();

        let missing = add_device(&shared, "Laptop 1", "Laptop", "Lab").await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        add_department(&shared, "Lab").await.unwrap();
        let device = add_device(&shared, "Laptop 1", "Laptop", "Lab").await.unwrap();
        let user = add_user(&shared, "An Nguyen", "Lab").await.unwrap();

        let stored: Device = fetch(&shared, &device.id).await.unwrap().unwrap();
        assert_eq!(stored, device);
        assert_eq!(store.count(DEVICES), 1);
        assert_eq!(fetch_all::<User>(&shared).await.unwrap().records(), &[user]);
        assert_eq!(store.count(USERS), 1);
    }

    #[tokio::test]
    async fn error_reports_keep_extra_fields() {
        let (store, shared) = setup();
        let details = json!({"message": "paper jam", "deviceName": "ignored"})
            .as_object()
            .cloned()
            .unwrap();

        let record = add_error(&shared, "Printer", details).await.unwrap();

        let stored = store.document(ERRORS, &record.id).unwrap();
        assert_eq!(stored["deviceName"], json!("Printer"));
        assert_eq!(stored["message"], json!("paper jam"));
        assert!(!stored.contains_key("id"));
    }

    #[tokio::test]
    async fn insert_rejects_blank_ids() {
        let (_, shared) = setup();
        let result = insert(&shared, &Department::new(" ", "Lab")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
