pub mod common;
pub mod departments;
pub mod devices;
pub mod errors;
pub mod stats;
pub mod users;
