//! Device model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::collections::DEVICES;
use super::record::{null_as_default, Record};
use crate::error::{Error, Result};
use crate::store::Fields;

/// A tracked asset.
///
/// `kind` is stored as `type` and never changes after creation. `image_url`
/// points at the latest uploaded QR artifact and is derived from the other
/// fields, not authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    /// Department name (not id).
    #[serde(default, deserialize_with = "null_as_default")]
    pub department_name: String,
    /// Assignee full name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub specifications: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub note: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_url: String,
}

impl Device {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        department_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            department_name: department_name.into(),
            ..Self::default()
        }
    }

    /// Whether an artifact has ever been linked to this device.
    #[must_use]
    pub fn has_artifact(&self) -> bool {
        !self.image_url.trim().is_empty()
    }
}

impl Record for Device {
    const COLLECTION: &'static str = DEVICES;

    fn id(&self) -> &str {
        &self.id
    }
}

/// User-editable device fields. Unset fields keep their current value.
///
/// There is no way to change the device type here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceEdits {
    pub name: Option<String>,
    pub department_name: Option<String>,
    pub user: Option<String>,
    /// Replaces the whole specification map when set.
    pub specifications: Option<BTreeMap<String, String>>,
    pub note: Option<String>,
}

impl DeviceEdits {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.department_name.is_none()
            && self.user.is_none()
            && self.specifications.is_none()
            && self.note.is_none()
    }

    /// Apply the edits on top of `device`, returning the resulting field values.
    #[must_use]
    pub fn apply_to(&self, device: &Device) -> Device {
        let mut next = device.clone();
        if let Some(name) = &self.name {
            next.name.clone_from(name);
        }
        if let Some(department_name) = &self.department_name {
            next.department_name.clone_from(department_name);
        }
        if let Some(user) = &self.user {
            next.user.clone_from(user);
        }
        if let Some(specifications) = &self.specifications {
            next.specifications.clone_from(specifications);
        }
        if let Some(note) = &self.note {
            next.note.clone_from(note);
        }
        next
    }

    /// Build the field update written for a save.
    ///
    /// Every editable field is written (not only the changed ones) together
    /// with the unchanged type, so the stored document always reflects one
    /// coherent form submission.
    pub fn to_update(&self, device: &Device) -> Result<Fields> {
        let next = self.apply_to(device);
        if next.name.trim().is_empty() {
            return Err(Error::InvalidInput("Device name cannot be empty".to_string()));
        }

        let mut fields = Fields::new();
        fields.insert("name".to_string(), Value::String(next.name.trim().to_string()));
        fields.insert("type".to_string(), Value::String(device.kind.clone()));
        fields.insert(
            "departmentName".to_string(),
            Value::String(next.department_name),
        );
        fields.insert("user".to_string(), Value::String(next.user));
        fields.insert(
            "specifications".to_string(),
            serde_json::to_value(&next.specifications)?,
        );
        fields.insert("note".to_string(), Value::String(next.note));
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::store::Document;

    fn document(fields: Value) -> Document {
        let Value::Object(fields) = fields else {
            panic!("fields must be an object");
        };
        Document::new("dev-1", fields)
    }

    #[test]
    fn decodes_store_field_names() {
        let doc = document(json!({
            "name": "Laptop 7",
            "type": "Laptop",
            "departmentName": "Lab",
            "user": "An Nguyen",
            "specifications": {"RAM": "16GB"},
            "note": "dented lid",
            "imageUrl": "https://blobs.example.com/devices/dev-1/1.png"
        }));

        let device = Device::from_document(&doc).unwrap();
        assert_eq!(device.id, "dev-1");
        assert_eq!(device.kind, "Laptop");
        assert_eq!(device.department_name, "Lab");
        assert_eq!(device.specifications.get("RAM").map(String::as_str), Some("16GB"));
        assert!(device.has_artifact());
    }

    #[test]
    fn missing_and_null_fields_decode_to_empty() {
        let doc = document(json!({"name": "Printer", "type": "Printer", "user": null}));
        let device = Device::from_document(&doc).unwrap();
        assert_eq!(device.user, "");
        assert!(device.specifications.is_empty());
        assert!(!device.has_artifact());
    }

    #[test]
    fn to_fields_omits_id_and_uses_store_names() {
        let device = Device::new("dev-9", "Router", "Network", "Ops");
        let fields = device.to_fields().unwrap();
        assert!(!fields.contains_key("id"));
        assert_eq!(fields.get("type"), Some(&json!("Network")));
        assert_eq!(fields.get("departmentName"), Some(&json!("Ops")));
    }

    #[test]
    fn edits_keep_type_and_unset_fields() {
        let mut device = Device::new("dev-1", "Laptop", "Laptop", "Lab");
        device.note = "old".to_string();
        let edits = DeviceEdits {
            user: Some("Binh".to_string()),
            ..DeviceEdits::default()
        };

        let fields = edits.to_update(&device).unwrap();
        assert_eq!(fields.get("type"), Some(&json!("Laptop")));
        assert_eq!(fields.get("note"), Some(&json!("old")));
        assert_eq!(fields.get("user"), Some(&json!("Binh")));
    }

    #[test]
    fn edits_reject_blank_name() {
        let device = Device::new("dev-1", "Laptop", "Laptop", "Lab");
        let edits = DeviceEdits {
            name: Some("   ".to_string()),
            ..DeviceEdits::default()
        };
        assert!(matches!(edits.to_update(&device), Err(Error::InvalidInput(_))));
    }
}
