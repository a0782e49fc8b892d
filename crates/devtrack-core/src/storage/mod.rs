//! Blob storage for rendered artifacts.

mod fs;
mod memory;
mod r2;

use async_trait::async_trait;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use r2::{R2BlobStore, R2Config};

use crate::Result;

/// Content store accepting byte payloads and returning a retrievable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return the URL it can be fetched from.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Validate and normalize an object key.
pub(crate) fn normalize_object_key(object_key: &str) -> Result<String> {
    let object_key = object_key.trim().trim_matches('/').to_string();
    if object_key.is_empty() || object_key.split('/').any(|part| part == "..") {
        return Err(crate::Error::InvalidInput(format!(
            "Invalid blob object key: '{object_key}'"
        )));
    }
    Ok(object_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_object_key_rejects_empty_and_traversal() {
        assert!(normalize_object_key(" / ").is_err());
        assert!(normalize_object_key("devices/../secrets").is_err());
        assert_eq!(
            normalize_object_key("/devices/d1/1.png/").unwrap(),
            "devices/d1/1.png"
        );
    }
}
