//! Device saves that keep the published QR artifact in step with the device.
//!
//! A save runs five steps in order: persist the edited fields, rebuild the
//! payload from what the store now holds, render it, upload the image under a
//! fresh key and link the new URL back onto the device. Any failure stops the
//! pipeline and reports the step; a retry starts over from the first step.

mod payload;
mod render;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

pub use payload::{decode_payload_url, payload_url, QrPayload};
pub use render::{ArtifactRenderer, QrOptions, QrRenderer};

use crate::config::CoreConfig;
use crate::models::collections::DEVICES;
use crate::models::{Device, DeviceEdits, Record};
use crate::storage::BlobStore;
use crate::store::{Fields, SharedStore, StoreError};
use crate::util::{sanitize_token, unix_millis_now};
use crate::{Error, Result};

/// Steps of a save, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveStep {
    Persist,
    Payload,
    Render,
    Upload,
    Link,
}

impl SaveStep {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persist => "persist",
            Self::Payload => "payload",
            Self::Render => "render",
            Self::Upload => "upload",
            Self::Link => "link",
        }
    }

    /// Steps that write to the document store or the blob store.
    const fn writes(self) -> bool {
        matches!(self, Self::Persist | Self::Upload | Self::Link)
    }
}

impl fmt::Display for SaveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub key: String,
    pub url: String,
}

/// A save that stopped before completing.
#[derive(Debug, Error)]
#[error("Device save failed at {step} step: {source}")]
pub struct SaveError {
    pub step: SaveStep,
    #[source]
    pub source: Error,
    /// The edited fields reached the store (or may have, when
    /// `outcome_unknown`), so `imageUrl` is stale.
    pub fields_persisted: bool,
    /// A write timed out. The caller stopped waiting, but the write may
    /// still land.
    pub outcome_unknown: bool,
    /// Artifact uploaded but not linked to the device.
    pub orphaned: Option<BlobRef>,
}

impl SaveError {
    fn new(step: SaveStep, source: Error) -> Self {
        let outcome_unknown = step.writes() && is_timeout(&source);
        Self {
            step,
            source,
            fields_persisted: outcome_unknown || !matches!(step, SaveStep::Persist),
            outcome_unknown,
            orphaned: None,
        }
    }

    /// Message shown to the operator.
    #[must_use]
    pub fn user_message(&self) -> String {
        if self.outcome_unknown {
            return match self.step {
                SaveStep::Persist => {
                    "Saving the device timed out. The changes may still have been stored; reload the device before saving again."
                }
                SaveStep::Link => {
                    "The device was saved and a new QR code uploaded, but linking it timed out. The device may still point at the old one; save again to retry."
                }
                _ => {
                    "The device was saved, but uploading its QR code timed out. Save again to retry."
                }
            }
            .to_string();
        }
        match self.step {
            SaveStep::Persist => match &self.source {
                Error::InvalidInput(message) => message.clone(),
                _ => "The device could not be saved. Nothing was changed; try again.".to_string(),
            },
            SaveStep::Payload => {
                "The device was saved, but it could not be read back to refresh its QR code. Save again to retry."
                    .to_string()
            }
            SaveStep::Render => {
                "The device was saved, but its QR code could not be generated. Save again to retry."
                    .to_string()
            }
            SaveStep::Upload => {
                "The device was saved, but its QR code could not be uploaded. Save again to retry."
                    .to_string()
            }
            SaveStep::Link => {
                "The device was saved and a new QR code uploaded, but the device still points at the old one. Save again to retry."
                    .to_string()
            }
        }
    }
}

/// A completed save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Device as persisted, including the new `image_url`.
    pub device: Device,
    pub payload: QrPayload,
    pub payload_url: String,
    pub artifact: BlobRef,
}

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Runs device saves against a document store and a blob store.
#[derive(Clone)]
pub struct ArtifactSync {
    store: SharedStore,
    blobs: Arc<dyn BlobStore>,
    renderer: Arc<dyn ArtifactRenderer>,
    config: CoreConfig,
    locks: Arc<Mutex<LockMap>>,
}

impl ArtifactSync {
    pub fn new(store: SharedStore, blobs: Arc<dyn BlobStore>, config: CoreConfig) -> Self {
        Self {
            store,
            blobs,
            renderer: Arc::new(QrRenderer::default()),
            config,
            locks: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ArtifactRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Last persisted state of a device.
    pub async fn load(&self, id: &str) -> Result<Device> {
        let document = self
            .bounded(self.store.get(DEVICES, id), store_timeout)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Device {id}")))?;
        Ok(Device::from_document(&document)?)
    }

    /// Drop unsaved edits by re-reading the device. Never writes.
    pub async fn discard(&self, id: &str) -> Result<Device> {
        tracing::debug!(device = %id, "Discarding unsaved device edits");
        self.load(id).await
    }

    /// Save `edits` on top of `device` and republish its QR artifact.
    ///
    /// `device` is the state the edit form was opened with; its type is
    /// written back unchanged.
    pub async fn save(
        &self,
        device: &Device,
        edits: &DeviceEdits,
    ) -> std::result::Result<SaveReport, SaveError> {
        let permit = self.acquire(&device.id).await;
        let started = unix_millis_now();

        let result = self.run_steps(device, edits).await;
        match &result {
            Ok(report) => tracing::info!(
                device = %device.id,
                key = %report.artifact.key,
                elapsed_ms = unix_millis_now() - started,
                "Device saved"
            ),
            Err(error) => tracing::warn!(
                device = %device.id,
                step = %error.step,
                fields_persisted = error.fields_persisted,
                outcome_unknown = error.outcome_unknown,
                error = %error.source,
                "Device save failed"
            ),
        }

        drop(permit);
        result
    }

    async fn run_steps(
        &self,
        device: &Device,
        edits: &DeviceEdits,
    ) -> std::result::Result<SaveReport, SaveError> {
        let id = device.id.as_str();

        let fields = edits
            .to_update(device)
            .map_err(|error| SaveError::new(SaveStep::Persist, error))?;
        self.bounded(self.store.update(DEVICES, id, fields), store_timeout)
            .await
            .map_err(|error| SaveError::new(SaveStep::Persist, error))?;
        tracing::debug!(device = %id, "Device fields persisted");

        let persisted = self
            .load(id)
            .await
            .map_err(|error| SaveError::new(SaveStep::Payload, error))?;
        let payload = QrPayload::from(&persisted);
        let url = payload_url(&self.config.qr_base_url, &payload)
            .map_err(|error| SaveError::new(SaveStep::Payload, error))?;
        tracing::debug!(device = %id, "QR payload built");

        let bytes = self
            .render(url.clone())
            .await
            .map_err(|error| SaveError::new(SaveStep::Render, error))?;
        tracing::debug!(device = %id, bytes = bytes.len(), "QR artifact rendered");

        let key = artifact_key(id);
        let content_type = self.renderer.content_type();
        let blob_url = self
            .bounded(self.blobs.put(&key, bytes, content_type), upload_timeout)
            .await
            .map_err(|error| SaveError::new(SaveStep::Upload, error))?;
        let artifact = BlobRef { key, url: blob_url };
        tracing::debug!(device = %id, key = %artifact.key, "QR artifact uploaded");

        let mut link = Fields::new();
        link.insert("imageUrl".to_string(), Value::String(artifact.url.clone()));
        if let Err(error) = self
            .bounded(self.store.update(DEVICES, id, link), store_timeout)
            .await
        {
            let mut error = SaveError::new(SaveStep::Link, error);
            if error.outcome_unknown && self.is_linked(id, &artifact.url).await {
                tracing::debug!(device = %id, key = %artifact.key, "QR artifact link landed late");
            } else {
                tracing::warn!(
                    device = %id,
                    key = %artifact.key,
                    url = %artifact.url,
                    outcome_unknown = error.outcome_unknown,
                    "Uploaded QR artifact left unlinked"
                );
                error.orphaned = Some(artifact);
                return Err(error);
            }
        }

        let mut device = persisted;
        device.image_url.clone_from(&artifact.url);
        Ok(SaveReport {
            device,
            payload,
            payload_url: url,
            artifact,
        })
    }

    async fn is_linked(&self, id: &str, url: &str) -> bool {
        self.load(id)
            .await
            .is_ok_and(|device| device.image_url == url)
    }

    async fn render(&self, content: String) -> Result<Vec<u8>> {
        let renderer = Arc::clone(&self.renderer);
        tokio::task::spawn_blocking(move || renderer.render(&content))
            .await
            .map_err(|error| Error::Render(format!("Render task failed: {error}")))?
    }

    async fn bounded<T, E, F>(&self, operation: F, on_timeout: fn(Duration) -> Error) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<Error>,
    {
        let Some(limit) = self.config.step_timeout else {
            return operation.await.map_err(Into::into);
        };
        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(on_timeout(limit)),
        }
    }

    async fn acquire(&self, id: &str) -> Option<SavePermit> {
        if !self.config.serialize_saves {
            return None;
        }
        let mut permit = SavePermit {
            locks: Arc::clone(&self.locks),
            guard: None,
        };
        let lock = Arc::clone(lock_map(&self.locks).entry(id.to_string()).or_default());
        permit.guard = Some(lock.lock_owned().await);
        Some(permit)
    }
}

/// Holds a device's save lock. Dropping it, including when the save future
/// is dropped mid-flight, unlocks and prunes entries nobody holds or awaits.
struct SavePermit {
    locks: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SavePermit {
    fn drop(&mut self) {
        self.guard = None;
        lock_map(&self.locks).retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

const fn is_timeout(error: &Error) -> bool {
    matches!(error, Error::Timeout(_) | Error::Store(StoreError::Timeout(_)))
}

fn store_timeout(limit: Duration) -> Error {
    let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
    Error::Store(StoreError::Timeout(millis))
}

const fn upload_timeout(limit: Duration) -> Error {
    Error::Timeout(limit)
}

/// Fresh object key for a device artifact. Never reused.
fn artifact_key(device_id: &str) -> String {
    let token = sanitize_token(device_id);
    let token = if token.is_empty() { "device" } else { &token };
    format!("devices/{token}/{}-{}.png", unix_millis_now(), Uuid::now_v7())
}
