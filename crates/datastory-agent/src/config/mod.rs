//! Configuration loading for Datastory.
//! Reads datastory.toml from the current directory or the path in DATASTORY_CONFIG.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "DATASTORY_CONFIG";
pub const API_KEY_ENV: &str = "DATASTORY_LLM_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), max_upload_mb: default_max_upload_mb() }
    }
}

fn default_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_max_upload_mb() -> usize { 50 }

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_llm_timeout(),
            api_key: None,
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 120 }

impl LlmConfig {
    /// The environment variable wins over the file; blank values count as unset.
    pub fn resolve_api_key(&self, from_env: Option<String>) -> Option<SecretString> {
        from_env
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
            .map(SecretString::from)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_python")]
    pub python: PathBuf,
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_figures_dir")]
    pub figures_dir: PathBuf,
    /// Modules importable by generated code on top of the built-in allow-list.
    #[serde(default)]
    pub extra_modules: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_secs: default_sandbox_timeout(),
            figures_dir: default_figures_dir(),
            extra_modules: Vec::new(),
        }
    }
}

fn default_python() -> PathBuf { PathBuf::from("python3") }
fn default_sandbox_timeout() -> u64 { 60 }
fn default_figures_dir() -> PathBuf { PathBuf::from("figures") }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: default_storage_root() }
    }
}

fn default_storage_root() -> PathBuf { PathBuf::from("data") }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rows of each dataset handed to the agents.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { sample_rows: default_sample_rows() }
    }
}

fn default_sample_rows() -> usize { datastory_common::SAMPLE_ROW_CAP }

impl Config {
    /// Load configuration from datastory.toml.
    /// Checks DATASTORY_CONFIG first, then the current directory. A missing
    /// file yields the defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "datastory.toml".to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.pipeline.sample_rows == 0 {
            anyhow::bail!("pipeline.sample_rows must be at least 1");
        }
        Ok(config)
    }
}
