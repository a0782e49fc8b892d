//! Department model

use serde::{Deserialize, Serialize};

use super::collections::DEPARTMENTS;
use super::record::{null_as_default, Record};

/// An organizational unit. Devices and users reference it by `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

impl Department {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Record for Department {
    const COLLECTION: &'static str = DEPARTMENTS;

    fn id(&self) -> &str {
        &self.id
    }
}
