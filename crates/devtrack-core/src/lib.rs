//! devtrack-core - Core library for devtrack
//!
//! Live views over departments, devices and users held in a multi-writer
//! document store, integrity-checked department deletes, and device saves
//! that republish the device's QR code.

pub mod artifact;
pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod records;
pub mod stats;
pub mod storage;
pub mod store;
pub mod sync;
pub mod util;
pub mod views;

pub use config::CoreConfig;
pub use error::{Error, Result};
pub use models::{Department, Device, DeviceEdits, ErrorRecord, User};
pub use store::{DocumentStore, SharedStore};
