//! Cloudflare R2 blob store for published QR artifacts.

use std::env;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use super::{normalize_object_key, BlobStore};
use crate::util::is_http_url;
use crate::{Error, Result};

const ENV_ACCOUNT_ID: &str = "R2_ACCOUNT_ID";
const ENV_BUCKET: &str = "R2_BUCKET";
const ENV_ACCESS_KEY_ID: &str = "R2_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "R2_SECRET_ACCESS_KEY";
const ENV_PUBLIC_BASE_URL: &str = "R2_PUBLIC_BASE_URL";

/// Variables in the order `R2Config` fields are filled from them.
const ENV_KEYS: [&str; 5] = [
    ENV_ACCOUNT_ID,
    ENV_BUCKET,
    ENV_ACCESS_KEY_ID,
    ENV_SECRET_ACCESS_KEY,
    ENV_PUBLIC_BASE_URL,
];

const CREDENTIALS_PROVIDER: &str = "devtrack-r2";

/// Cloudflare R2 configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct R2Config {
    /// Cloudflare account identifier.
    pub account_id: String,
    /// R2 bucket name.
    pub bucket: String,
    /// Access key id for S3-compatible auth.
    pub access_key_id: String,
    /// Secret access key for S3-compatible auth.
    pub secret_access_key: String,
    /// Public URL base the bucket is served from.
    pub public_base_url: String,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("R2Config")
            .field("account_id", &self.account_id)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl R2Config {
    /// Load R2 configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no R2 variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// Cloudflare R2 S3-compatible endpoint URL.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

/// Publishes artifacts to an R2 bucket served from a public base URL.
#[derive(Clone, Debug)]
pub struct R2BlobStore {
    config: R2Config,
    client: Client,
}

impl R2BlobStore {
    #[must_use]
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );
        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::new()
                .region(Region::new("auto"))
                .credentials_provider(credentials)
                .endpoint_url(config.endpoint_url())
                .force_path_style(true)
                .build(),
        );
        Self { config, client }
    }

    /// Public URL an uploaded artifact is reachable at.
    #[must_use]
    pub fn public_object_url(&self, object_key: &str) -> String {
        let key = object_key.trim_matches('/');
        format!("{}/{key}", self.config.public_base_url)
    }
}

#[async_trait]
impl BlobStore for R2BlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let key = normalize_object_key(key)?;
        let size = bytes.len();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(ByteStream::from(bytes));
        if !content_type.trim().is_empty() {
            request = request.content_type(content_type.trim());
        }

        if let Err(error) = request.send().await {
            return Err(Error::Storage(format!(
                "Upload of {}/{key} to R2 failed: {error}",
                self.config.bucket
            )));
        }

        tracing::debug!(bucket = %self.config.bucket, %key, size, "Artifact uploaded to R2");
        Ok(self.public_object_url(&key))
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<R2Config>> {
    let values = ENV_KEYS.map(|name| lookup(name).map(|value| value.trim().to_string()));
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }

    let missing = ENV_KEYS
        .iter()
        .zip(&values)
        .filter(|(_, value)| value.as_deref().unwrap_or_default().is_empty())
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "R2 upload needs every R2_* variable; missing {}",
            missing.join(", ")
        )));
    }

    let [account_id, bucket, access_key_id, secret_access_key, public_base_url] =
        values.map(Option::unwrap_or_default);
    if !is_http_url(&public_base_url) {
        return Err(Error::InvalidInput(format!(
            "{ENV_PUBLIC_BASE_URL} must be an http(s) URL"
        )));
    }

    Ok(Some(R2Config {
        account_id,
        bucket,
        access_key_id,
        secret_access_key,
        public_base_url: public_base_url.trim_end_matches('/').to_string(),
    }))
}
