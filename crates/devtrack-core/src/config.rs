//! Runtime configuration for the core components.
//!
//! Values come from environment variables; `parse_config` takes a lookup
//! function so parsing can be tested without touching the process env.

use std::env;
use std::time::Duration;

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const ENV_QR_BASE_URL: &str = "DEVTRACK_QR_BASE_URL";
const ENV_STEP_TIMEOUT_MS: &str = "DEVTRACK_STEP_TIMEOUT_MS";
const ENV_SERIALIZE_SAVES: &str = "DEVTRACK_SERIALIZE_SAVES";

/// Base URL QR payloads are embedded into when nothing is configured.
pub const DEFAULT_QR_BASE_URL: &str = "https://devtrack.example.com/device";

/// Core configuration shared by the sync controller and its callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// `https://<host>/<path>` prefix of the QR payload URL.
    pub qr_base_url: String,
    /// Upper bound for each I/O step of a save. `None` waits indefinitely.
    pub step_timeout: Option<Duration>,
    /// Serialize concurrent saves of the same device.
    pub serialize_saves: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            qr_base_url: DEFAULT_QR_BASE_URL.to_string(),
            step_timeout: None,
            serialize_saves: true,
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        parse_config(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn with_qr_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.qr_base_url = base_url.into();
        self
    }

    #[must_use]
    pub const fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_serialized_saves(mut self, enabled: bool) -> Self {
        self.serialize_saves = enabled;
        self
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<CoreConfig> {
    let mut config = CoreConfig::default();

    if let Some(base_url) = normalize_text_option(lookup(ENV_QR_BASE_URL)) {
        if !is_http_url(&base_url) || base_url.contains('?') {
            return Err(Error::InvalidInput(format!(
                "{ENV_QR_BASE_URL} must be an http(s) URL without a query string"
            )));
        }
        config.qr_base_url = base_url.trim_end_matches('/').to_string();
    }

    if let Some(raw) = normalize_text_option(lookup(ENV_STEP_TIMEOUT_MS)) {
        let millis = raw.parse::<u64>().map_err(|_| {
            Error::InvalidInput(format!(
                "{ENV_STEP_TIMEOUT_MS} must be a whole number of milliseconds"
            ))
        })?;
        config.step_timeout = (millis > 0).then(|| Duration::from_millis(millis));
    }

    if let Some(raw) = normalize_text_option(lookup(ENV_SERIALIZE_SAVES)) {
        config.serialize_saves = match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "{ENV_SERIALIZE_SAVES} must be true or false"
                )))
            }
        };
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<CoreConfig> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn empty_environment_uses_defaults() {
        assert_eq!(parse_from_map(&HashMap::new()).unwrap(), CoreConfig::default());
    }

    #[test]
    fn parses_all_values() {
        let map = HashMap::from([
            (ENV_QR_BASE_URL, "https://qr.example.org/devices/"),
            (ENV_STEP_TIMEOUT_MS, "2500"),
            (ENV_SERIALIZE_SAVES, "off"),
        ]);

        let config = parse_from_map(&map).unwrap();
        assert_eq!(config.qr_base_url, "https://qr.example.org/devices");
        assert_eq!(config.step_timeout, Some(Duration::from_millis(2500)));
        assert!(!config.serialize_saves);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let map = HashMap::from([(ENV_STEP_TIMEOUT_MS, "0")]);
        assert_eq!(parse_from_map(&map).unwrap().step_timeout, None);
    }

    #[test]
    fn rejects_invalid_values() {
        let bad_url = HashMap::from([(ENV_QR_BASE_URL, "qr.example.org")]);
        assert!(parse_from_map(&bad_url).is_err());

        let bad_timeout = HashMap::from([(ENV_STEP_TIMEOUT_MS, "soon")]);
        assert!(parse_from_map(&bad_timeout).is_err());

        let bad_flag = HashMap::from([(ENV_SERIALIZE_SAVES, "maybe")]);
        assert!(parse_from_map(&bad_flag).is_err());
    }
}
