//! User (assignee) model

use serde::{Deserialize, Serialize};

use super::collections::USERS;
use super::record::{null_as_default, Record};

/// A person devices can be assigned to. Read-only in this crate apart from creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fullname: String,
    /// Department name (not id).
    #[serde(default, deserialize_with = "null_as_default")]
    pub department: String,
}

impl User {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        fullname: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            fullname: fullname.into(),
            department: department.into(),
        }
    }
}

impl Record for User {
    const COLLECTION: &'static str = USERS;

    fn id(&self) -> &str {
        &self.id
    }
}
