//! Application configuration for SocialFlow.
//!
//! User config lives at `~/.socialflow/socialflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SocialFlowError};
use crate::types::{GenerationLimits, HistoryMode};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "socialflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".socialflow";

// ---------------------------------------------------------------------------
// Config structs (matching socialflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Gemini backend settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Per-operation generation limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Conversation store and retention.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Transcript provider settings.
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Content type used when none is given.
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Conversational state discipline for `discuss`.
    #[serde(default)]
    pub history_mode: HistoryMode,

    /// Path of the libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            content_type: default_content_type(),
            history_mode: HistoryMode::default(),
            database_path: default_database_path(),
        }
    }
}

fn default_content_type() -> String {
    "general".into()
}
fn default_database_path() -> String {
    "~/.socialflow/socialflow.db".into()
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every operation.
    #[serde(default = "default_model")]
    pub model: String,

    /// API root, overridable for proxies and tests.
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_gemini_base_url(),
        }
    }
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_model() -> String {
    "gemini-1.5-pro-latest".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

/// `[limits]` section with one table per operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_summarize_limits")]
    pub summarize: OperationLimitsConfig,
    #[serde(default = "default_discuss_limits")]
    pub discuss: OperationLimitsConfig,
    #[serde(default = "default_translate_limits")]
    pub translate: OperationLimitsConfig,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            summarize: default_summarize_limits(),
            discuss: default_discuss_limits(),
            translate: default_translate_limits(),
        }
    }
}

/// `[limits.<operation>]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLimitsConfig {
    pub max_output_units: u32,
    pub temperature: f32,
    /// Upper bound on a single generation call.
    pub timeout_secs: u64,
}

fn default_summarize_limits() -> OperationLimitsConfig {
    OperationLimitsConfig {
        max_output_units: 8192,
        temperature: 0.4,
        timeout_secs: 120,
    }
}
fn default_discuss_limits() -> OperationLimitsConfig {
    OperationLimitsConfig {
        max_output_units: 2048,
        temperature: 0.7,
        timeout_secs: 60,
    }
}
fn default_translate_limits() -> OperationLimitsConfig {
    OperationLimitsConfig {
        max_output_units: 8192,
        temperature: 0.2,
        timeout_secs: 120,
    }
}

/// Which conversation store backs persisted history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// The libSQL database at `defaults.database_path`.
    #[default]
    Database,
    /// Process-local map, lost on exit.
    Memory,
}

/// `[conversation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default)]
    pub store: StoreKind,

    /// Maximum number of topic logs held by the in-memory store (0 = unbounded).
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,

    /// Idle seconds after which an in-memory topic log expires (0 = never).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            max_topics: default_max_topics(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_max_topics() -> usize {
    1024
}
fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// `[transcript]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    #[serde(default = "default_transcript_base_url")]
    pub base_url: String,

    /// Caption language requested from the provider.
    #[serde(default = "default_transcript_language")]
    pub language: String,

    #[serde(default = "default_transcript_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            base_url: default_transcript_base_url(),
            language: default_transcript_language(),
            timeout_secs: default_transcript_timeout(),
        }
    }
}

fn default_transcript_base_url() -> String {
    "https://www.youtube.com".into()
}
fn default_transcript_language() -> String {
    "en".into()
}
fn default_transcript_timeout() -> u64 {
    15
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Limits plus timeout for one operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationLimits {
    pub limits: GenerationLimits,
    pub timeout: Duration,
}

impl From<&OperationLimitsConfig> for OperationLimits {
    fn from(config: &OperationLimitsConfig) -> Self {
        Self {
            limits: GenerationLimits {
                max_output_units: config.max_output_units,
                temperature: config.temperature,
            },
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub history_mode: HistoryMode,
    pub summarize: OperationLimits,
    pub discuss: OperationLimits,
    pub translate: OperationLimits,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            history_mode: config.defaults.history_mode,
            summarize: OperationLimits::from(&config.limits.summarize),
            discuss: OperationLimits::from(&config.limits.discuss),
            translate: OperationLimits::from(&config.limits.translate),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Runtime retention policy for in-memory conversation logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    pub max_topics: Option<usize>,
    pub ttl: Option<Duration>,
}

impl From<&ConversationConfig> for RetentionPolicy {
    fn from(config: &ConversationConfig) -> Self {
        Self {
            max_topics: (config.max_topics > 0).then_some(config.max_topics),
            ttl: (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.socialflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SocialFlowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.socialflow/socialflow.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SocialFlowError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        SocialFlowError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_limits(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SocialFlowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SocialFlowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SocialFlowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the Gemini API key env var is set and non-empty, and return it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SocialFlowError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SocialFlowError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

fn validate_limits(config: &AppConfig) -> Result<()> {
    for (name, limits) in [
        ("summarize", &config.limits.summarize),
        ("discuss", &config.limits.discuss),
        ("translate", &config.limits.translate),
    ] {
        OperationLimits::from(limits)
            .limits
            .validate()
            .map_err(|e| SocialFlowError::config(format!("[limits.{name}]: {}", e.cause())))?;
        if limits.timeout_secs == 0 {
            return Err(SocialFlowError::config(format!(
                "[limits.{name}]: timeout_secs must be greater than zero"
            )));
        }
    }
    Ok(())
}
