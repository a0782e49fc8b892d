//! Typed record decoding on top of raw store documents

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::{Document, Fields};

/// A domain record living in one document-store collection.
///
/// Records decode from a [`Document`] by merging the document id into its
/// fields, so `id` is never stored as a field itself.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection the record lives in.
    const COLLECTION: &'static str;

    /// Document id of this record.
    fn id(&self) -> &str;

    /// Decode a record from a raw document.
    fn from_document(document: &Document) -> serde_json::Result<Self> {
        let mut fields = document.fields.clone();
        fields.insert("id".to_string(), Value::String(document.id.clone()));
        serde_json::from_value(Value::Object(fields))
    }

    /// Encode the record as store fields (without the id).
    fn to_fields(&self) -> serde_json::Result<Fields> {
        match serde_json::to_value(self)? {
            Value::Object(mut fields) => {
                fields.remove("id");
                Ok(fields)
            }
            _ => Err(<serde_json::Error as serde::ser::Error>::custom(
                "record must serialize to a JSON object",
            )),
        }
    }
}

/// A fully-materialized, ordered point-in-time set of records.
///
/// Every emission of a change stream is a complete replacement, never a diff.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet<T> {
    records: Vec<T>,
}

impl<T> RecordSet<T> {
    #[must_use]
    pub const fn new(records: Vec<T>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }
}

impl<T: Record> RecordSet<T> {
    /// Decode a raw snapshot. Documents that do not decode as `T` are skipped
    /// and logged; one malformed document never hides the rest of a view.
    pub fn from_documents(documents: &[Document]) -> Self {
        let records = documents
            .iter()
            .filter_map(|document| match T::from_document(document) {
                Ok(record) => Some(record),
                Err(error) => {
                    tracing::warn!(
                        collection = T::COLLECTION,
                        id = %document.id,
                        %error,
                        "Skipping document that does not match the record schema"
                    );
                    None
                }
            })
            .collect();
        Self::new(records)
    }
}

impl<T> Default for RecordSet<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> From<Vec<T>> for RecordSet<T> {
    fn from(records: Vec<T>) -> Self {
        Self::new(records)
    }
}

impl<'a, T> IntoIterator for &'a RecordSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Generate a new document id (UUID v7, time-sortable).
#[must_use]
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

/// Treat an explicit `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
