//! Data models for devtrack

mod department;
mod device;
mod error_record;
mod record;
mod user;

pub use department::Department;
pub use device::{Device, DeviceEdits};
pub use error_record::ErrorRecord;
pub use record::{new_record_id, Record, RecordSet};
pub use user::User;

/// Collection names as they exist in the document store.
pub mod collections {
    pub const DEPARTMENTS: &str = "DEPARTMENTS";
    pub const DEVICES: &str = "DEVICES";
    pub const USERS: &str = "USERS";
    pub const ERRORS: &str = "ERROR";
}
