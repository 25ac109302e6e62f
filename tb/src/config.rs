//! TaskBreaker configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main TaskBreaker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Decomposition pipeline tuning
    pub pipeline: PipelineConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .taskbreaker.yml
        let local_config = PathBuf::from(".taskbreaker.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/taskbreaker/taskbreaker.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskbreaker").join("taskbreaker.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("anthropic" or "openai")
    pub provider: String,

    /// Default model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        let key = std::env::var(&self.api_key_env)
            .with_context(|| format!("LLM API key not found. Set the {} environment variable.", self.api_key_env))?;
        if key.trim().is_empty() {
            return Err(eyre::eyre!("{} is set but empty", self.api_key_env));
        }
        Ok(key)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8192,
            timeout_ms: 120_000,
        }
    }
}

/// When composite steps get their children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefinementMode {
    /// Refine every composite top-level step right away
    #[default]
    Eager,
    /// Only flag composite steps; the caller refines on demand
    Deferred,
}

impl std::fmt::Display for RefinementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefinementMode::Eager => write!(f, "eager"),
            RefinementMode::Deferred => write!(f, "deferred"),
        }
    }
}

impl std::str::FromStr for RefinementMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eager" => Ok(RefinementMode::Eager),
            "deferred" => Ok(RefinementMode::Deferred),
            other => Err(format!("unknown refinement mode '{}' (expected eager or deferred)", other)),
        }
    }
}

/// Decomposition pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model for the fast complexity classification call
    #[serde(rename = "classifier-model")]
    pub classifier_model: Option<String>,

    /// Model for the verification pass
    #[serde(rename = "verifier-model")]
    pub verifier_model: Option<String>,

    /// Model for deep-dive refinement
    #[serde(rename = "refiner-model")]
    pub refiner_model: Option<String>,

    /// Multiplier applied to size midpoints to absorb ADHD start-up overhead
    #[serde(rename = "overhead-factor")]
    pub overhead_factor: f64,

    /// Relative drift tolerated before durations are rescaled
    pub tolerance: f64,

    /// Eager or deferred refinement
    pub refinement: RefinementMode,

    /// Depth cap for automatic refinement
    #[serde(rename = "eager-max-depth")]
    pub eager_max_depth: u32,

    /// Depth cap for caller-triggered refinement
    #[serde(rename = "deferred-max-depth")]
    pub deferred_max_depth: u32,

    /// Token budget for the decomposition call
    #[serde(rename = "architect-max-tokens")]
    pub architect_max_tokens: u32,

    /// Sampling temperature for generative stages
    pub temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier_model: None,
            verifier_model: None,
            refiner_model: None,
            overhead_factor: 1.5,
            tolerance: 0.15,
            refinement: RefinementMode::Eager,
            eager_max_depth: 1,
            deferred_max_depth: 3,
            architect_max_tokens: 2048,
            temperature: 0.4,
        }
    }
}

impl PipelineConfig {
    /// Depth cap for the given refinement mode
    pub fn max_depth(&self, mode: RefinementMode) -> u32 {
        match mode {
            RefinementMode::Eager => self.eager_max_depth,
            RefinementMode::Deferred => self.deferred_max_depth,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the task JSONL file
    #[serde(rename = "store-dir")]
    pub store_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/taskbreaker on Linux)
        let store_dir = dirs::data_dir()
            .map(|d| d.join("taskbreaker"))
            .unwrap_or_else(|| PathBuf::from(".taskbreaker"));

        Self { store_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.pipeline.refinement, RefinementMode::Eager);
        assert_eq!(config.pipeline.eager_max_depth, 1);
        assert_eq!(config.pipeline.deferred_max_depth, 3);
        assert!((config.pipeline.overhead_factor - 1.5).abs() < f64::EPSILON);
        assert!((config.pipeline.tolerance - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: openai
  model: gpt-4o
  api-key-env: MY_API_KEY
  base-url: https://api.example.com
  max-tokens: 4096
  timeout-ms: 60000

pipeline:
  classifier-model: gpt-4o-mini
  refinement: deferred
  deferred-max-depth: 2
  overhead-factor: 1.2

storage:
  store-dir: /tmp/tb-store
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.pipeline.classifier_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.pipeline.refinement, RefinementMode::Deferred);
        assert_eq!(config.pipeline.max_depth(RefinementMode::Deferred), 2);
        assert_eq!(config.pipeline.max_depth(RefinementMode::Eager), 1);
        assert_eq!(config.storage.store_dir, PathBuf::from("/tmp/tb-store"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
llm:
  model: claude-haiku
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "claude-haiku");
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.pipeline.architect_max_tokens, 2048);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "pipeline:\n  eager-max-depth: 2").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.pipeline.eager_max_depth, 2);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let missing = PathBuf::from("/nonexistent/taskbreaker.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    #[serial]
    fn test_load_project_local_config() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".taskbreaker.yml"), "pipeline:\n  refinement: deferred\n").unwrap();

        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let loaded = Config::load(None);
        std::env::set_current_dir(previous).unwrap();

        assert_eq!(loaded.unwrap().pipeline.refinement, RefinementMode::Deferred);
    }

    #[test]
    fn test_refinement_mode_from_str() {
        assert_eq!("EAGER".parse::<RefinementMode>().unwrap(), RefinementMode::Eager);
        assert_eq!("deferred".parse::<RefinementMode>().unwrap(), RefinementMode::Deferred);
        assert!("lazy".parse::<RefinementMode>().is_err());
    }
}
