//! Application configuration for bomenrich.
//!
//! User config lives at `~/.bomenrich/bomenrich.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BomError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bomenrich.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bomenrich";

// ---------------------------------------------------------------------------
// Config structs (matching bomenrich.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Checkpoint/cache store settings.
    #[serde(default)]
    pub store: StoreSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for job storage (artifacts + metadata).
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Checkpoint cadence: flush the grid every N processed rows.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    /// How many data rows below the header feed column inference.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            checkpoint_every: default_checkpoint_every(),
            sample_rows: default_sample_rows(),
        }
    }
}

fn default_storage_dir() -> String {
    "~/bomenrich-jobs".into()
}
fn default_checkpoint_every() -> usize {
    10
}
fn default_sample_rows() -> usize {
    5
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for the part-lookup (search) stage.
    #[serde(default = "default_search_model")]
    pub search_model: String,

    /// Model used for the three-line formatting stage.
    #[serde(default = "default_format_model")]
    pub format_model: String,

    /// Append the `:online` web-search suffix to the search model.
    #[serde(default = "default_true")]
    pub web_search: bool,

    /// Per-call HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry attempts for transient transport failures.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between retries, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            search_model: default_search_model(),
            format_model: default_format_model(),
            web_search: true,
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_search_model() -> String {
    "deepseek/deepseek-chat".into()
}
fn default_format_model() -> String {
    "deepseek/deepseek-chat".into()
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Seconds a working-set entry may sit idle before eviction.
    #[serde(default = "default_working_ttl_secs")]
    pub working_ttl_secs: u64,

    /// Seconds between sweeper runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Hours an artifact file may age before pruning.
    #[serde(default = "default_artifact_max_age_hours")]
    pub artifact_max_age_hours: u64,

    /// Artifact files kept per job (newest first).
    #[serde(default = "default_max_artifacts_per_job")]
    pub max_artifacts_per_job: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            working_ttl_secs: default_working_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            artifact_max_age_hours: default_artifact_max_age_hours(),
            max_artifacts_per_job: default_max_artifacts_per_job(),
        }
    }
}

fn default_working_ttl_secs() -> u64 {
    300
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_artifact_max_age_hours() -> u64 {
    24
}
fn default_max_artifacts_per_job() -> usize {
    20
}

// ---------------------------------------------------------------------------
// Enrich config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime enrichment configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Checkpoint cadence in rows.
    pub checkpoint_every: usize,
    /// Sample rows fed to column inference.
    pub sample_rows: usize,
    /// Search-stage model id.
    pub search_model: String,
    /// Format-stage model id.
    pub format_model: String,
    /// Whether the search model gets the `:online` suffix.
    pub web_search: bool,
    /// Per-call HTTP timeout in seconds.
    pub timeout_secs: u64,
    /// Retry attempts for transient failures.
    pub retry_attempts: u32,
    /// Fixed retry delay in milliseconds.
    pub retry_delay_ms: u64,
    /// Cap on rows processed in one run (CLI `--limit`); `None` means all.
    pub row_limit: Option<usize>,
}

impl From<&AppConfig> for EnrichConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            checkpoint_every: config.defaults.checkpoint_every,
            sample_rows: config.defaults.sample_rows,
            search_model: config.openrouter.search_model.clone(),
            format_model: config.openrouter.format_model.clone(),
            web_search: config.openrouter.web_search,
            timeout_secs: config.openrouter.timeout_secs,
            retry_attempts: config.openrouter.retry_attempts,
            retry_delay_ms: config.openrouter.retry_delay_ms,
            row_limit: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bomenrich/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BomError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bomenrich/bomenrich.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| BomError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BomError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BomError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BomError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BomError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the configured env var.
///
/// The key only ever lives in the environment; config files name the
/// variable, never the value.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(BomError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

/// Expand a leading `~/` against the user's home directory.
pub fn resolve_path(raw: &str) -> Result<PathBuf> {
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| BomError::config("could not determine home directory"))?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(raw))
}
