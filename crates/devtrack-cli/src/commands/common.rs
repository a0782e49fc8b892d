use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use devtrack_core::artifact::ArtifactSync;
use devtrack_core::guard::Confirmer;
use devtrack_core::models::{Department, Device};
use devtrack_core::records;
use devtrack_core::storage::{BlobStore, FsBlobStore, R2BlobStore, R2Config};
use devtrack_core::store::SqliteStore;
use devtrack_core::views::Groups;
use devtrack_core::{CoreConfig, SharedStore};
use serde::Serialize;

use crate::error::CliError;

/// Store handles shared by every command.
pub struct Context {
    pub sqlite: SqliteStore,
    pub store: SharedStore,
    pub blobs: Arc<dyn BlobStore>,
    pub config: CoreConfig,
}

impl Context {
    pub fn open(db_path: &Path, blob_dir: &Path) -> Result<Self, CliError> {
        let sqlite = SqliteStore::open(db_path)?;
        let blobs: Arc<dyn BlobStore> = match R2Config::from_env()? {
            Some(config) => {
                tracing::debug!(bucket = %config.bucket, "Publishing QR codes to R2");
                Arc::new(R2BlobStore::new(config))
            }
            None => {
                let store = FsBlobStore::new(blob_dir);
                tracing::debug!(root = %store.root().display(), "Writing QR codes to disk");
                Arc::new(store)
            }
        };

        Ok(Self::new(sqlite, blobs, CoreConfig::from_env()?))
    }

    pub fn new(sqlite: SqliteStore, blobs: Arc<dyn BlobStore>, config: CoreConfig) -> Self {
        Self {
            store: Arc::new(sqlite.clone()),
            sqlite,
            blobs,
            config,
        }
    }

    pub fn artifact_sync(&self) -> ArtifactSync {
        ArtifactSync::new(
            Arc::clone(&self.store),
            Arc::clone(&self.blobs),
            self.config.clone(),
        )
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("DEVTRACK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    data_dir().join("devtrack.db")
}

pub fn resolve_blob_dir(cli_blob_dir: Option<PathBuf>) -> PathBuf {
    cli_blob_dir
        .or_else(|| env::var_os("DEVTRACK_BLOB_DIR").map(PathBuf::from))
        .unwrap_or_else(|| data_dir().join("qr"))
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devtrack")
}

/// Find a department by exact name, falling back to its id.
pub async fn resolve_department(store: &SharedStore, query: &str) -> Result<Department, CliError> {
    let query = query.trim();
    if let Some(department) = records::find_department(store, query).await? {
        return Ok(department);
    }
    records::fetch::<Department>(store, query)
        .await?
        .ok_or_else(|| CliError::DepartmentNotFound(query.to_string()))
}

/// Find a device by full id or unique id prefix.
pub async fn resolve_device(store: &SharedStore, query: &str) -> Result<Device, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::DeviceNotFound(query.to_string()));
    }
    if let Some(device) = records::fetch::<Device>(store, query).await? {
        return Ok(device);
    }

    let devices = records::fetch_all::<Device>(store).await?;
    let matches = devices
        .iter()
        .filter(|device| device.id.starts_with(query))
        .collect::<Vec<_>>();

    match matches.as_slice() {
        [] => Err(CliError::DeviceNotFound(query.to_string())),
        [device] => Ok((*device).clone()),
        several => {
            let options = several
                .iter()
                .take(3)
                .map(|device| short_id(&device.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousDeviceId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Parse repeated `KEY=VALUE` arguments into a specification map.
pub fn parse_specs(entries: &[String]) -> Result<BTreeMap<String, String>, CliError> {
    entries
        .iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| CliError::InvalidSpec(entry.clone()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::InvalidSpec(entry.clone()));
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_device_groups(groups: &Groups<Device>) -> Vec<String> {
    let mut lines = Vec::new();
    for (kind, devices) in groups {
        let label = if kind.is_empty() { "(no type)" } else { kind };
        lines.push(format!("{label} ({})", devices.len()));
        for device in devices {
            let assignee = if device.user.is_empty() {
                "-"
            } else {
                &device.user
            };
            lines.push(format!(
                "  {:<13}  {:<24}  {:<16}  {assignee}",
                short_id(&device.id),
                device.name,
                device.department_name
            ));
        }
    }
    lines
}

#[derive(Debug, Serialize)]
pub struct DeviceGroupItem<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub devices: &'a [Device],
}

pub fn device_group_items(groups: &Groups<Device>) -> Vec<DeviceGroupItem<'_>> {
    groups
        .iter()
        .map(|(kind, devices)| DeviceGroupItem {
            kind,
            devices,
        })
        .collect()
}

/// Asks on stdin. Anything but `y`/`yes` declines; so does a closed or
/// non-interactive stdin.
pub struct StdinConfirmer;

#[async_trait::async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            if !stdin.is_terminal() {
                return false;
            }
            print!("{prompt} [y/N] ");
            if io::stdout().flush().is_err() {
                return false;
            }
            let mut answer = String::new();
            stdin.lock().read_line(&mut answer).is_ok() && is_affirmative(&answer)
        })
        .await
        .unwrap_or(false)
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
