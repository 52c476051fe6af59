//! Shared types, error model, and configuration for nzbrelay.
//!
//! This crate is the foundation depended on by all other nzbrelay crates.
//! It provides:
//! - [`RelayError`]: the unified error type
//! - Domain types ([`InboundMessage`], [`ParsedAnnouncement`], [`ReleaseJob`], [`KeywordSet`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChannelsConfig, GrammarConfig, IndexerConfig, IrcServerConfig, PathsConfig,
    UploadConfig, config_dir, config_file_path, expand_path, init_config, load_config,
    load_config_from, optional_env, require_env, validate_config,
};
pub use error::{RelayError, Result};
pub use types::{Category, InboundMessage, KeywordSet, ParsedAnnouncement, ReleaseJob};
