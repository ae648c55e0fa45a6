//! Shared types, error model, and configuration for Lingoflow.
//!
//! This crate is the foundation depended on by all other Lingoflow crates.
//! It provides:
//! - [`LingoflowError`]: the unified error type
//! - Domain types ([`LanguageCode`])
//! - Configuration ([`AppConfig`], [`TranslationConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CategoryConfig, LinksConfig, NotionConfig, OpenAiConfig, TranslationConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, read_secret,
    validate_api_keys,
};
pub use error::{LingoflowError, Result};
pub use types::LanguageCode;
