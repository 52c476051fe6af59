//! HTTP collaborators of the fulfillment pipeline.
//!
//! This crate provides:
//! - [`metadata`]: indexer search + image/artifact link extraction
//! - [`download`]: streaming downloads with optional gzip decoding
//! - [`upload`]: multipart re-upload of finished artifacts

pub mod download;
pub mod metadata;
pub mod upload;

use std::time::Duration;

use nzbrelay_shared::{RelayError, Result};
use reqwest::Client;

pub use download::fetch_to_file;
pub use metadata::{LinkPatterns, MetadataClient, ReleaseLinks};
pub use upload::Uploader;

/// User-Agent string for every outbound request.
pub const USER_AGENT: &str = concat!("nzbrelay/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Build the shared HTTP client.
///
/// `timeout` of `None` keeps the transport defaults; per-request timeouts
/// (uploads) are applied on the request itself.
pub fn build_client(timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| RelayError::Network(format!("failed to build HTTP client: {e}")))
}
