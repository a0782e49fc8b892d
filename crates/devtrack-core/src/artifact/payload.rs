//! QR payload encoding.
//!
//! The payload is a compact JSON summary of a device, URL-encoded into the
//! `data` query parameter of a configurable base URL. Scanning the QR code
//! opens that URL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Device;
use crate::{Error, Result};

const DATA_PARAM: &str = "data=";

/// Device summary embedded in the QR code.
///
/// Field names differ from the stored document (`specs`, `notes`,
/// `department`); scanners depend on them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    pub id: String,
    pub name: String,
    pub user: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub specs: BTreeMap<String, String>,
    pub notes: String,
    pub department: String,
}

impl From<&Device> for QrPayload {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            user: device.user.clone(),
            kind: device.kind.clone(),
            specs: device.specifications.clone(),
            notes: device.note.clone(),
            department: device.department_name.clone(),
        }
    }
}

/// `{base_url}?data=<url-encoded JSON>`
pub fn payload_url(base_url: &str, payload: &QrPayload) -> Result<String> {
    let json = serde_json::to_string(payload)?;
    Ok(format!("{base_url}?{DATA_PARAM}{}", urlencoding::encode(&json)))
}

/// Recover the payload from a URL produced by [`payload_url`].
pub fn decode_payload_url(url: &str) -> Result<QrPayload> {
    let (_, query) = url
        .split_once('?')
        .ok_or_else(|| Error::InvalidInput("Payload URL has no query string".to_string()))?;

    let encoded = query
        .split('&')
        .find_map(|pair| pair.strip_prefix(DATA_PARAM))
        .ok_or_else(|| Error::InvalidInput("Payload URL has no data parameter".to_string()))?;

    let json = urlencoding::decode(encoded)
        .map_err(|error| Error::InvalidInput(format!("Payload is not valid UTF-8: {error}")))?;
    Ok(serde_json::from_str(&json)?)
}
