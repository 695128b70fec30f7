use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::SamplingOptions;
use crate::prompts::StoryForm;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    /// Sampling defaults for every request except scene prose.
    #[serde(default)]
    pub sampling: SamplingOptions,

    /// Sampling used when generating scene prose.
    #[serde(default = "SamplingOptions::scene")]
    pub scene_sampling: SamplingOptions,

    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            sampling: SamplingOptions::default(),
            scene_sampling: SamplingOptions::scene(),
            generation: GenerationConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    /// Completion backend name; only "koboldcpp" is supported.
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_retry_count")]
    pub retry_count: usize,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            endpoint: default_endpoint(),
            request_timeout_seconds: default_request_timeout(),
            max_tokens: default_max_tokens(),
            retry_count: default_retry_count(),
            retry_delay_seconds: default_retry_delay(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub form: StoryForm,

    /// Word budget for the previous-scene tail carried into a scene prompt.
    #[serde(default = "default_context_window_words")]
    pub context_window_words: usize,

    /// Attempts per pipeline stage before giving up on malformed output.
    #[serde(default = "default_max_stage_retries")]
    pub max_stage_retries: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            form: StoryForm::default(),
            context_window_words: default_context_window_words(),
            max_stage_retries: default_max_stage_retries(),
        }
    }
}

fn default_backend() -> String {
    "koboldcpp".to_string()
}
fn default_endpoint() -> String {
    "http://localhost:5001/v1".to_string()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_retry_count() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    5
}
fn default_context_window_words() -> usize {
    400
}
fn default_max_stage_retries() -> usize {
    10
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.yml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.backend, "koboldcpp");
        assert_eq!(config.llm.endpoint, "http://localhost:5001/v1");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.generation.context_window_words, 400);
        assert_eq!(config.scene_sampling.temperature, 0.9);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "llm:\n  endpoint: http://example.com:5001/v1\n";
        let config: Config = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.llm.endpoint, "http://example.com:5001/v1");
        assert_eq!(config.llm.backend, "koboldcpp");
        assert_eq!(config.scene_sampling.temperature, 0.9);
        assert_eq!(config.generation.max_stage_retries, 10);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yml");
        let mut config = Config::default();
        config.llm.endpoint = "http://10.0.0.2:5001/v1".to_string();
        config.generation.context_window_words = 250;
        config.save(&path).expect("save");
        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded.llm.endpoint, config.llm.endpoint);
        assert_eq!(loaded.generation.context_window_words, 250);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.yml");
        assert!(Config::load_from(&missing).is_err());
    }
}
