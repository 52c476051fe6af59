//! Application configuration for nzbrelay.
//!
//! User config lives at `~/.nzbrelay/nzbrelay.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file: each section names the
//! environment variable that holds them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "nzbrelay.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".nzbrelay";

// ---------------------------------------------------------------------------
// Config structs (matching nzbrelay.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Read-side chat connection.
    #[serde(default)]
    pub listener: IrcServerConfig,

    /// Optional write-side chat connection. Falls back to `listener`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announcer: Option<IrcServerConfig>,

    /// Destination channels per category.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Metadata endpoint settings.
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Re-upload endpoint settings.
    #[serde(default)]
    pub upload: UploadConfig,

    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Announcement grammar tuning.
    #[serde(default)]
    pub grammar: GrammarConfig,
}

impl AppConfig {
    /// The connection used to post announcements.
    pub fn announcer(&self) -> &IrcServerConfig {
        self.announcer.as_ref().unwrap_or(&self.listener)
    }

    /// Whether read and write paths use separate connections.
    pub fn has_separate_announcer(&self) -> bool {
        self.announcer.is_some()
    }
}

/// `[listener]` / `[announcer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcServerConfig {
    /// Server host name.
    #[serde(default = "default_irc_host")]
    pub host: String,

    /// Server port (plain TCP).
    #[serde(default = "default_irc_port")]
    pub port: u16,

    /// Nickname to register with.
    #[serde(default = "default_nick")]
    pub nick: String,

    /// Username (ident).
    #[serde(default = "default_nick")]
    pub username: String,

    /// Name of the env var holding the server/bouncer password, if any.
    #[serde(default = "default_irc_password_env")]
    pub password_env: String,

    /// Channels to join after registration.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Senders whose announcements are considered.
    #[serde(default = "default_watched_senders")]
    pub watched_senders: Vec<String>,

    /// Delay between reconnect attempts.
    #[serde(default = "default_reconnect_wait_ms")]
    pub reconnect_wait_ms: u64,

    /// Give up after this many consecutive failed attempts.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for IrcServerConfig {
    fn default() -> Self {
        Self {
            host: default_irc_host(),
            port: default_irc_port(),
            nick: default_nick(),
            username: default_nick(),
            password_env: default_irc_password_env(),
            channels: Vec::new(),
            watched_senders: default_watched_senders(),
            reconnect_wait_ms: default_reconnect_wait_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl IrcServerConfig {
    /// Password from the configured env var; `None` when unset or empty.
    pub fn password(&self) -> Option<String> {
        optional_env(&self.password_env)
    }
}

fn default_irc_host() -> String {
    "localhost".into()
}
fn default_irc_port() -> u16 {
    6667
}
fn default_nick() -> String {
    "nzbrelay".into()
}
fn default_irc_password_env() -> String {
    "IRC_PASS".into()
}
fn default_watched_senders() -> Vec<String> {
    vec!["omgwtfnzb".into(), "Batman76".into(), "Batman76-".into()]
}
fn default_reconnect_wait_ms() -> u64 {
    4000
}
fn default_max_reconnect_attempts() -> u32 {
    100
}

/// `[channels]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Default / `HD-CLIPS` channel.
    #[serde(default = "default_hd_channel")]
    pub hd: String,
    /// `UHD-CLIPS` channel.
    #[serde(default = "default_uhd_channel")]
    pub uhd: String,
    /// `TRANS` channel.
    #[serde(default = "default_trans_channel")]
    pub trans: String,
    /// Fallback channel for special-type releases with no routable category.
    #[serde(default = "default_special_channel")]
    pub special: String,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            hd: default_hd_channel(),
            uhd: default_uhd_channel(),
            trans: default_trans_channel(),
            special: default_special_channel(),
        }
    }
}

impl ChannelsConfig {
    /// All configured destination channels, skipping blanks and duplicates.
    pub fn all(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for chan in [&self.hd, &self.uhd, &self.trans, &self.special] {
            if !chan.trim().is_empty() && !out.contains(chan) {
                out.push(chan.clone());
            }
        }
        out
    }
}

fn default_hd_channel() -> String {
    "#XXX1080".into()
}
fn default_uhd_channel() -> String {
    "#XXX2160".into()
}
fn default_trans_channel() -> String {
    "#XXXGAYTRANS".into()
}
fn default_special_channel() -> String {
    "#P0RNL0VER".into()
}

/// `[indexer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Metadata search endpoint.
    #[serde(default = "default_indexer_url")]
    pub base_url: String,

    /// Name of the env var holding the indexer user name.
    #[serde(default = "default_indexer_user_env")]
    pub user_env: String,

    /// Name of the env var holding the indexer API key.
    #[serde(default = "default_indexer_key_env")]
    pub api_key_env: String,

    /// Pattern locating the image URL in the response body.
    #[serde(default = "default_image_pattern")]
    pub image_pattern: String,

    /// Pattern locating the artifact URL in the response body.
    #[serde(default = "default_artifact_pattern")]
    pub artifact_pattern: String,

    /// Optional request timeout; transport defaults apply when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: default_indexer_url(),
            user_env: default_indexer_user_env(),
            api_key_env: default_indexer_key_env(),
            image_pattern: default_image_pattern(),
            artifact_pattern: default_artifact_pattern(),
            timeout_secs: None,
        }
    }
}

fn default_indexer_url() -> String {
    "https://api.omgwtfnzbs.org/xml/".into()
}
fn default_indexer_user_env() -> String {
    "OMG_USER".into()
}
fn default_indexer_key_env() -> String {
    "OMG_API_KEY".into()
}
fn default_image_pattern() -> String {
    r"https://i\.omgwtfnzbs\.org/pr0n/[0-9a-z_/]+\.jpg".into()
}
fn default_artifact_pattern() -> String {
    r#"https://api\.omgwtfnzbs\.org/nzb/\?id=[^<"]+"#.into()
}

/// `[upload]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload endpoint. Empty disables the upload stage's network call.
    #[serde(default)]
    pub url: String,

    /// Name of the env var holding the upload API key.
    #[serde(default = "default_upload_key_env")]
    pub api_key_env: String,

    /// Upper bound for one upload request.
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key_env: default_upload_key_env(),
            timeout_secs: default_upload_timeout(),
        }
    }
}

fn default_upload_key_env() -> String {
    "UPLOAD_API_KEY".into()
}
fn default_upload_timeout() -> u64 {
    60
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Transient downloads (images, temporary artifacts).
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Durable artifact output directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Dedup database file.
    #[serde(default = "default_database")]
    pub database: String,

    /// JSON array of classifier keywords, re-read for every message.
    #[serde(default = "default_keywords_file")]
    pub keywords_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            output_dir: default_output_dir(),
            database: default_database(),
            keywords_file: default_keywords_file(),
        }
    }
}

fn default_work_dir() -> String {
    "temp".into()
}
fn default_output_dir() -> String {
    "~/.config/NZBGet/nzb".into()
}
fn default_database() -> String {
    "~/.nzbrelay/releases.db".into()
}
fn default_keywords_file() -> String {
    "keywords.json".into()
}

/// `[grammar]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarConfig {
    /// First year of the accepted window.
    #[serde(default = "default_first_year")]
    pub first_year: u16,
    /// Last year of the accepted window.
    #[serde(default = "default_last_year")]
    pub last_year: u16,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            first_year: default_first_year(),
            last_year: default_last_year(),
        }
    }
}

fn default_first_year() -> u16 {
    2020
}
fn default_last_year() -> u16 {
    2026
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.nzbrelay/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RelayError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.nzbrelay/nzbrelay.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RelayError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RelayError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file to `path` (or the default location).
/// Returns the path to the created file.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| RelayError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RelayError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RelayError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a required secret from the env var named `var_name`.
pub fn require_env(var_name: &str) -> Result<String> {
    optional_env(var_name).ok_or_else(|| {
        RelayError::config(format!(
            "required secret not found. Set the {var_name} environment variable."
        ))
    })
}

/// Read an optional secret; empty values count as unset.
pub fn optional_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_path(raw: &str) -> PathBuf {
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}

/// Check the parts of a config that would otherwise fail mid-job.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    url::Url::parse(&config.indexer.base_url).map_err(|e| {
        RelayError::config(format!(
            "indexer.base_url '{}' is not a valid URL: {e}",
            config.indexer.base_url
        ))
    })?;

    if !config.upload.url.is_empty() {
        url::Url::parse(&config.upload.url).map_err(|e| {
            RelayError::config(format!(
                "upload.url '{}' is not a valid URL: {e}",
                config.upload.url
            ))
        })?;
    }

    if config.grammar.first_year > config.grammar.last_year {
        return Err(RelayError::config(format!(
            "grammar.first_year ({}) is after grammar.last_year ({})",
            config.grammar.first_year, config.grammar.last_year
        )));
    }

    if config.channels.hd.trim().is_empty() {
        return Err(RelayError::config("channels.hd must not be empty"));
    }

    Ok(())
}
