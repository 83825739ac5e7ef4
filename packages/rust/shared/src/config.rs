//! Application configuration for orgscout.
//!
//! User config lives at `~/.orgscout/orgscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "orgscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".orgscout";

// ---------------------------------------------------------------------------
// Config structs (matching orgscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run defaults (concurrency, pacing, limits).
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Web search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Extraction backend settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Global avoid-list settings.
    #[serde(default)]
    pub avoid: AvoidConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory under which run workspaces are created.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Candidate URLs kept per field after avoid-list filtering.
    #[serde(default = "default_results_per_field")]
    pub results_per_field: usize,

    /// Field-URL fetches in flight at once within one entity.
    #[serde(default = "default_field_concurrency")]
    pub field_concurrency: usize,

    /// Entities in flight at once across the run.
    #[serde(default = "default_entity_concurrency")]
    pub entity_concurrency: usize,

    /// Pause between entity starts, in milliseconds.
    #[serde(default)]
    pub entity_delay_ms: u64,

    /// Page navigation timeout, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Visible text is cut to this many characters before extraction.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,

    /// Scalar field that receives the homepage meta description.
    #[serde(default = "default_summary_field")]
    pub summary_field: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            results_per_field: default_results_per_field(),
            field_concurrency: default_field_concurrency(),
            entity_concurrency: default_entity_concurrency(),
            entity_delay_ms: 0,
            fetch_timeout_secs: default_fetch_timeout(),
            max_page_chars: default_max_page_chars(),
            summary_field: default_summary_field(),
        }
    }
}

fn default_output_dir() -> String {
    "data".into()
}
fn default_results_per_field() -> usize {
    3
}
fn default_field_concurrency() -> usize {
    3
}
fn default_entity_concurrency() -> usize {
    3
}
fn default_fetch_timeout() -> u64 {
    60
}
fn default_max_page_chars() -> usize {
    20_000
}
fn default_summary_field() -> String {
    "characterSummary".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Brave web search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Results requested per query, before avoid-list filtering.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key_env: default_search_key_env(),
            results_per_query: default_results_per_query(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://api.search.brave.com/res/v1/web/search".into()
}
fn default_search_key_env() -> String {
    "BRAVE_API_KEY".into()
}
fn default_results_per_query() -> usize {
    10
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_extraction_base_url")]
    pub base_url: String,

    /// Model used for every extraction call.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_extraction_key_env")]
    pub api_key_env: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: default_extraction_base_url(),
            model: default_model(),
            api_key_env: default_extraction_key_env(),
        }
    }
}

fn default_extraction_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_extraction_key_env() -> String {
    "OPENAI_API_KEY".into()
}

/// `[avoid]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvoidConfig {
    /// Env var holding a JSON array of globally banned hostnames.
    #[serde(default = "default_avoid_env")]
    pub env_var: String,
}

impl Default for AvoidConfig {
    fn default() -> Self {
        Self {
            env_var: default_avoid_env(),
        }
    }
}

fn default_avoid_env() -> String {
    "GLOBAL_AVOID_DOMAINS".into()
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory for run workspaces.
    pub output_root: PathBuf,
    /// Candidate URLs kept per field (K).
    pub results_per_field: usize,
    /// Field-URL fetch bound within one entity (N₁).
    pub field_concurrency: usize,
    /// Entity bound across the run (N₂).
    pub entity_concurrency: usize,
    /// Fixed pause between entity starts.
    pub entity_delay: Duration,
    /// Per-page navigation timeout.
    pub fetch_timeout: Duration,
    /// Visible-text truncation length.
    pub max_page_chars: usize,
    /// Scalar field filled from the homepage meta description.
    pub summary_field: String,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_root: PathBuf::from(&config.defaults.output_dir),
            results_per_field: config.defaults.results_per_field,
            field_concurrency: config.defaults.field_concurrency.max(1),
            entity_concurrency: config.defaults.entity_concurrency.max(1),
            entity_delay: Duration::from_millis(config.defaults.entity_delay_ms),
            fetch_timeout: Duration::from_secs(config.defaults.fetch_timeout_secs),
            max_page_chars: config.defaults.max_page_chars,
            summary_field: config.defaults.summary_field.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.orgscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.orgscout/orgscout.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ScoutError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ScoutError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| ScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a required API key from the env var named in config.
pub fn require_api_key(var_name: &str, service: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ScoutError::config(format!(
            "{service} API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("BRAVE_API_KEY"));
        assert!(toml_str.contains("GLOBAL_AVOID_DOMAINS"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.results_per_field, 3);
        assert_eq!(parsed.extraction.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
entity_concurrency = 1
entity_delay_ms = 1500

[extraction]
model = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.entity_concurrency, 1);
        assert_eq!(config.defaults.field_concurrency, 3);
        assert_eq!(config.extraction.model, "gpt-4o-mini");
        assert_eq!(config.extraction.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let mut app = AppConfig::default();
        app.defaults.field_concurrency = 0;
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.results_per_field, 3);
        assert_eq!(pipeline.field_concurrency, 1);
        assert_eq!(pipeline.entity_concurrency, 3);
        assert_eq!(pipeline.fetch_timeout, Duration::from_secs(60));
        assert_eq!(pipeline.max_page_chars, 20_000);
    }

    #[test]
    fn missing_api_key_is_reported() {
        // Use a unique env var name to avoid interfering with other tests
        let result = require_api_key("ORGSCOUT_TEST_NONEXISTENT_KEY_12345", "Brave");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Brave API key not found"));
    }
}
