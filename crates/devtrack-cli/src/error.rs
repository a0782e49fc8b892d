use std::io;

use devtrack_core::artifact::SaveError;
use devtrack_core::guard::DeleteError;
use devtrack_core::store::StoreError;
use devtrack_core::sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] devtrack_core::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("{}", .0.user_message())]
    Delete(#[from] DeleteError),
    #[error("{}", .0.user_message())]
    Save(#[from] SaveError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Blocked(&'static str),
    #[error("Department not found: {0}")]
    DepartmentNotFound(String),
    #[error("Device not found for id/prefix: {0}")]
    DeviceNotFound(String),
    #[error("{0}")]
    AmbiguousDeviceId(String),
    #[error("Invalid specification entry '{0}'; expected KEY=VALUE")]
    InvalidSpec(String),
    #[error("Nothing to change; pass at least one field to edit")]
    NothingToEdit,
}
