//! In-memory blob store for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{normalize_object_key, BlobStore};
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    objects: HashMap<String, (Vec<u8>, String)>,
    puts: Vec<String>,
    fail_with: Option<String>,
}

/// Thread-safe in-memory [`BlobStore`] returning `mem://` URLs.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail with `message` (or succeed again with `None`).
    pub fn fail_puts(&self, message: Option<&str>) {
        self.lock().fail_with = message.map(ToOwned::to_owned);
    }

    /// Keys passed to `put`, in call order (including failed calls).
    #[must_use]
    pub fn put_keys(&self) -> Vec<String> {
        self.lock().puts.clone()
    }

    /// Stored bytes and content type for a key.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.lock().objects.get(key).cloned()
    }

    /// Resolve a URL returned by `put` back to its key.
    #[must_use]
    pub fn key_for_url(url: &str) -> Option<&str> {
        url.strip_prefix("mem://")
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let key = normalize_object_key(key)?;
        let mut inner = self.lock();
        inner.puts.push(key.clone());
        if let Some(message) = &inner.fail_with {
            return Err(Error::Storage(message.clone()));
        }
        inner
            .objects
            .insert(key.clone(), (bytes, content_type.to_string()));
        Ok(format!("mem://{key}"))
    }
}
