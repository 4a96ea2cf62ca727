//! Configuration management for the HealthBench harness
//!
//! Loads dataset variants, provider endpoints and run settings from TOML
//! files and provides runtime access.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::DatasetSource;
use crate::grading::GraderKind;
use crate::providers::openai::{DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_datasets")]
    pub datasets: IndexMap<String, DatasetConfig>,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// A named dataset variant. Exactly one of `url`, `path` or `builtin` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Which backend serves the model under evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChatBackend {
    Ollama,
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAI,
}

/// Chat provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_backend")]
    pub provider: ChatBackend,
    /// Falls back to the backend's public default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Only read for the `openai` backend
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Judge model settings for the generative grader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_base_url")]
    pub base_url: String,
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_judge_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Run execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_grader")]
    pub grader: GraderKind,
    #[serde(default = "default_dataset_timeout_ms")]
    pub dataset_timeout_ms: u64,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Percentage at or above which a case counts as passed
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    /// Length proxy used by the heuristic grader's penalty policy
    #[serde(default = "default_penalty_min_chars")]
    pub penalty_min_chars: usize,
}

// Default value functions
fn default_chat_backend() -> ChatBackend { ChatBackend::Ollama }
fn default_chat_model() -> String { "medical-assistant".to_string() }
fn default_chat_temperature() -> f32 { 0.7 }
fn default_chat_timeout_ms() -> u64 { 300_000 }
fn default_api_key_env() -> String { DEFAULT_API_KEY_ENV.to_string() }
fn default_judge_base_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_judge_model() -> String { "gpt-4".to_string() }
fn default_judge_timeout_ms() -> u64 { 120_000 }
fn default_grader() -> GraderKind { GraderKind::Heuristic }
fn default_dataset_timeout_ms() -> u64 { 60_000 }
fn default_output() -> PathBuf { PathBuf::from("healthbench_results.json") }
fn default_pass_threshold() -> f64 { 50.0 }
fn default_penalty_min_chars() -> usize { 20 }

const HEALTHBENCH_BASE: &str = "https://openaipublic.blob.core.windows.net/simple-evals/healthbench";

fn default_datasets() -> IndexMap<String, DatasetConfig> {
    let mut datasets = IndexMap::new();
    datasets.insert("standard".to_string(), DatasetConfig {
        url: Some(format!("{}/2025-05-07-06-14-12_oss_eval.jsonl", HEALTHBENCH_BASE)),
        description: "Full HealthBench evaluation set".to_string(),
        ..Default::default()
    });
    datasets.insert("hard".to_string(), DatasetConfig {
        url: Some(format!("{}/hard_2025-05-08-21-00-10.jsonl", HEALTHBENCH_BASE)),
        description: "HealthBench Hard subset".to_string(),
        ..Default::default()
    });
    datasets.insert("consensus".to_string(), DatasetConfig {
        url: Some(format!("{}/consensus_2025-05-09-20-00-46.jsonl", HEALTHBENCH_BASE)),
        description: "HealthBench Consensus subset".to_string(),
        ..Default::default()
    });
    datasets.insert("sample".to_string(), DatasetConfig {
        builtin: Some(crate::dataset::loader::BUILTIN_SAMPLE.to_string()),
        description: "Five bundled Chinese-language cases for offline smoke runs".to_string(),
        ..Default::default()
    });
    datasets
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_chat_backend(),
            base_url: None,
            model: default_chat_model(),
            temperature: default_chat_temperature(),
            timeout_ms: default_chat_timeout_ms(),
            system_prompt: None,
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_judge_base_url(),
            model: default_judge_model(),
            temperature: 0.0,
            timeout_ms: default_judge_timeout_ms(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            grader: default_grader(),
            dataset_timeout_ms: default_dataset_timeout_ms(),
            output: default_output(),
            pass_threshold: default_pass_threshold(),
            penalty_min_chars: default_penalty_min_chars(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datasets: default_datasets(),
            chat: ChatConfig::default(),
            judge: JudgeConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/healthbench.toml",
            "healthbench/config/healthbench.toml",
        ];

        for path in &config_paths {
            if Path::new(path).exists() {
                match Self::from_file(path) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", path);
                        return config;
                    }
                    Err(e) => tracing::warn!("Ignoring {}: {}", path, e),
                }
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve a dataset variant name to its source
    pub fn dataset_source(&self, name: &str) -> Result<DatasetSource, ConfigError> {
        self.datasets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDataset(name.to_string()))?
            .source(name)
    }
}

impl DatasetConfig {
    /// Turn this entry into a loadable source
    pub fn source(&self, name: &str) -> Result<DatasetSource, ConfigError> {
        match (&self.url, &self.path, &self.builtin) {
            (Some(url), None, None) => Ok(DatasetSource::Url(url.clone())),
            (None, Some(path), None) => Ok(DatasetSource::File(path.clone())),
            (None, None, Some(builtin)) => Ok(DatasetSource::Builtin(builtin.clone())),
            _ => Err(ConfigError::InvalidDataset(format!(
                "dataset '{}' must set exactly one of url, path or builtin",
                name
            ))),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown dataset variant: {0}")]
    UnknownDataset(String),

    #[error("Invalid dataset entry: {0}")]
    InvalidDataset(String),
}
