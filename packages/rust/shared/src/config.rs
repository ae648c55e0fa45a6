//! Application configuration for Lingoflow.
//!
//! User config lives at `~/.lingoflow/lingoflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LingoflowError, Result};
use crate::types::LanguageCode;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lingoflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lingoflow";

// ---------------------------------------------------------------------------
// Config structs (matching lingoflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Document store settings.
    #[serde(default)]
    pub notion: NotionConfig,

    /// Completion service settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Translation pipeline tuning.
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Internal link localization.
    #[serde(default)]
    pub links: LinksConfig,

    /// Destination categories (one collection per blog theme).
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

/// `[notion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    /// Name of the env var holding the integration token (never store the token itself).
    #[serde(default = "default_notion_key_env")]
    pub api_key_env: String,

    /// API base URL.
    #[serde(default = "default_notion_base_url")]
    pub base_url: String,

    /// Value sent in the `Notion-Version` header.
    #[serde(default = "default_notion_version")]
    pub version: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_notion_key_env(),
            base_url: default_notion_base_url(),
            version: default_notion_version(),
        }
    }
}

fn default_notion_key_env() -> String {
    "NOTION_API_TOKEN".into()
}
fn default_notion_base_url() -> String {
    "https://api.notion.com/v1".into()
}
fn default_notion_version() -> String {
    "2022-06-28".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// API base URL (any OpenAI-compatible endpoint).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model used for segment translation.
    #[serde(default = "default_translate_model")]
    pub translate_model: String,

    /// Model used for destination-language SEO metadata.
    #[serde(default = "default_seo_model")]
    pub seo_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            translate_model: default_translate_model(),
            seo_model: default_seo_model(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_translate_model() -> String {
    "gpt-4o-mini".into()
}
fn default_seo_model() -> String {
    "gpt-4o-mini".into()
}

/// `[translation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Language of the source documents.
    #[serde(default = "default_source_language")]
    pub source_language: LanguageCode,

    /// Languages every source document should also exist in.
    #[serde(default = "default_target_languages")]
    pub target_languages: Vec<LanguageCode>,

    /// Text segments per translation request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Top-level nodes processed per orchestrator invocation.
    #[serde(default = "default_nodes_per_invocation")]
    pub nodes_per_invocation: usize,

    /// Tasks processed by one `auto` run.
    #[serde(default = "default_max_tasks_per_run")]
    pub max_tasks_per_run: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_languages: default_target_languages(),
            batch_size: default_batch_size(),
            nodes_per_invocation: default_nodes_per_invocation(),
            max_tasks_per_run: default_max_tasks_per_run(),
        }
    }
}

fn default_source_language() -> LanguageCode {
    LanguageCode::new("zh-hans")
}
fn default_target_languages() -> Vec<LanguageCode> {
    vec![LanguageCode::new("en"), LanguageCode::new("zh-hant")]
}
fn default_batch_size() -> usize {
    30
}
fn default_nodes_per_invocation() -> usize {
    40
}
fn default_max_tasks_per_run() -> usize {
    1
}

/// `[links]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Whether internal links are rewritten to the target-language sibling.
    #[serde(default = "default_true")]
    pub localize: bool,

    /// Public site domain whose `/<section>/<slug>` links are localized.
    #[serde(default = "default_site_domain")]
    pub site_domain: String,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            localize: true,
            site_domain: default_site_domain(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_site_domain() -> String {
    "playfishlab.com".into()
}

/// `[[categories]]` entry: a blog theme and the collection holding its documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Theme name (e.g. `Playfish`, `FIRE`).
    pub name: String,
    /// Collection (database) identifier in the document store.
    pub collection_id: String,
    /// URL section used by the public site; defaults to the lowercased name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl CategoryConfig {
    /// URL section for links into this category.
    pub fn section(&self) -> String {
        self.section
            .clone()
            .unwrap_or_else(|| self.name.to_lowercase())
    }
}

impl AppConfig {
    /// Look up a category by theme name (case-insensitive).
    pub fn category(&self, name: &str) -> Result<&CategoryConfig> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| LingoflowError::config(format!("unknown blog theme: {name}")))
    }

    /// Check the tuning values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.translation.batch_size == 0 {
            return Err(LingoflowError::config("translation.batch_size must be > 0"));
        }
        if self.translation.nodes_per_invocation == 0 {
            return Err(LingoflowError::config(
                "translation.nodes_per_invocation must be > 0",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lingoflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LingoflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lingoflow/lingoflow.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| LingoflowError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LingoflowError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LingoflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LingoflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LingoflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the environment variable named by `var_name`.
pub fn read_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LingoflowError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that both service credentials are present.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    read_secret(&config.notion.api_key_env)?;
    read_secret(&config.openai.api_key_env)?;
    Ok(())
}
