//! Reported device error model

use serde::{Deserialize, Serialize};

use super::collections::ERRORS;
use super::record::{null_as_default, Record};
use crate::store::Fields;

/// A reported fault against a device, consumed only for statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_name: String,
    /// Remaining report fields, kept verbatim.
    #[serde(flatten)]
    pub details: Fields,
}

impl ErrorRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            device_name: device_name.into(),
            details: Fields::new(),
        }
    }
}

impl Record for ErrorRecord {
    const COLLECTION: &'static str = ERRORS;

    fn id(&self) -> &str {
        &self.id
    }
}
