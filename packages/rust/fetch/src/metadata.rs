//! Indexer metadata lookup.
//!
//! The indexer answers a search with an XML-ish body; we do not parse it,
//! we only locate the first image URL and the first artifact URL in it.

use std::time::Duration;

use nzbrelay_shared::{IndexerConfig, RelayError, Result, require_env};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

// ---------------------------------------------------------------------------
// Link extraction
// ---------------------------------------------------------------------------

/// Links extracted from one metadata response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseLinks {
    /// First image URL, if any.
    pub image_url: Option<String>,
    /// First artifact URL with entities decoded, if any.
    pub artifact_url: Option<String>,
}

/// Compiled image / artifact URL patterns.
#[derive(Debug, Clone)]
pub struct LinkPatterns {
    image: Regex,
    artifact: Regex,
}

impl LinkPatterns {
    /// Compile both patterns.
    pub fn new(image: &str, artifact: &str) -> Result<Self> {
        let compile = |what: &str, pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                RelayError::validation(format!("invalid {what} pattern '{pattern}': {e}"))
            })
        };
        Ok(Self {
            image: compile("image", image)?,
            artifact: compile("artifact", artifact)?,
        })
    }

    /// Patterns from the `[indexer]` config section.
    pub fn from_config(config: &IndexerConfig) -> Result<Self> {
        Self::new(&config.image_pattern, &config.artifact_pattern)
    }

    /// First-match extraction of both links from `body`.
    pub fn extract(&self, body: &str) -> ReleaseLinks {
        ReleaseLinks {
            image_url: self.image.find(body).map(|m| m.as_str().to_string()),
            artifact_url: self
                .artifact
                .find(body)
                .map(|m| m.as_str().replace("&amp;", "&")),
        }
    }
}

// ---------------------------------------------------------------------------
// MetadataClient
// ---------------------------------------------------------------------------

/// Client for the indexer search endpoint.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: Client,
    base_url: Url,
    user: String,
    api_key: String,
    patterns: LinkPatterns,
    timeout: Option<Duration>,
}

impl MetadataClient {
    /// Create a client for `base_url` with explicit credentials.
    pub fn new(
        client: Client,
        base_url: &str,
        user: impl Into<String>,
        api_key: impl Into<String>,
        patterns: LinkPatterns,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            RelayError::config(format!("invalid indexer URL '{base_url}': {e}"))
        })?;
        Ok(Self {
            client,
            base_url,
            user: user.into(),
            api_key: api_key.into(),
            patterns,
            timeout: None,
        })
    }

    /// Create a client from the `[indexer]` section, reading credentials
    /// from the configured environment variables.
    pub fn from_config(client: Client, config: &IndexerConfig) -> Result<Self> {
        let user = require_env(&config.user_env)?;
        let api_key = require_env(&config.api_key_env)?;
        let patterns = LinkPatterns::from_config(config)?;
        let mut this = Self::new(client, &config.base_url, user, api_key, patterns)?;
        this.timeout = config.timeout_secs.map(Duration::from_secs);
        Ok(this)
    }

    /// Search URL for `release_name`.
    pub fn search_url(&self, release_name: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("search", release_name)
            .append_pair("user", &self.user)
            .append_pair("api", &self.api_key)
            .append_pair("pw", "0,1");
        url
    }

    /// Fetch the raw metadata body for `release_name`.
    pub async fn fetch(&self, release_name: &str) -> Result<String> {
        let url = self.search_url(release_name);
        let mut request = self.client.get(url.clone());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        // The search URL carries the API key; reqwest errors must drop it.
        let response = request.send().await.map_err(|e| {
            RelayError::Fetch(format!("{}: {}", self.base_url, e.without_url()))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Fetch(format!("{}: HTTP {status}", self.base_url)));
        }

        response
            .text()
            .await
            .map_err(|e| {
                RelayError::Fetch(format!(
                    "{}: failed to read body: {}",
                    self.base_url,
                    e.without_url()
                ))
            })
    }

    /// Fetch metadata and extract the release links.
    #[instrument(skip(self), fields(indexer = %self.base_url))]
    pub async fn lookup(&self, release_name: &str) -> Result<ReleaseLinks> {
        let body = self.fetch(release_name).await?;
        let links = self.patterns.extract(&body);
        debug!(
            body_len = body.len(),
            image = links.image_url.is_some(),
            artifact = links.artifact_url.is_some(),
            "metadata received"
        );
        Ok(links)
    }
}
