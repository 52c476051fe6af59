//! Multipart re-upload of finished artifacts.

use std::path::Path;
use std::time::Duration;

use nzbrelay_shared::{RelayError, Result, UploadConfig, require_env};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::{info, instrument};
use url::Url;

/// Client for the re-upload endpoint.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: Client,
    url: Url,
    api_key: String,
    timeout: Duration,
}

impl Uploader {
    pub fn new(
        client: Client,
        url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| RelayError::config(format!("invalid upload URL '{url}': {e}")))?;
        Ok(Self {
            client,
            url,
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Build from the `[upload]` section, reading the API key from its env var.
    pub fn from_config(client: Client, config: &UploadConfig) -> Result<Self> {
        let api_key = require_env(&config.api_key_env)?;
        Self::new(
            client,
            &config.url,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("apikey", &self.api_key);
        url
    }

    /// Upload `path` under `release_name`.
    ///
    /// Fields: `rlsname`, the file as `nzb`, and the literal `upload=upload`.
    #[instrument(skip(self, path), fields(endpoint = %self.url))]
    pub async fn upload(&self, release_name: &str, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RelayError::Upload(format!("cannot read {}: {e}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{release_name}.nzb"));

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/x-nzb")
            .map_err(|e| RelayError::Upload(e.to_string()))?;
        let form = Form::new()
            .text("rlsname", release_name.to_string())
            .part("nzb", part)
            .text("upload", "upload");

        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::Upload(format!("{}: {}", self.url, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Upload(format!("{}: HTTP {status}", self.url)));
        }

        info!(release = release_name, %status, "artifact uploaded");
        Ok(())
    }
}
