//! Pipeline configuration: analyzer endpoint, chunking and concurrency.
//!
//! Loaded from an optional JSON file (every field defaulted), then overridden
//! by environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Which analyzer service answers chunk requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerProvider {
    /// OpenAI-compatible `/chat/completions`.
    OpenAi,
    /// Local Ollama `/api/generate`.
    Ollama,
}

impl AnalyzerProvider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" | "open_ai" => Some(Self::OpenAi),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-3.5-turbo",
            Self::Ollama => "llama3",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub provider: AnalyzerProvider,
    /// Model name; provider default when unset.
    pub model: Option<String>,
    /// Service base URL; provider default when unset.
    pub base_url: Option<String>,
    /// Bearer token for OpenAI-compatible services. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Characters per chunk.
    pub chunk_size: usize,
    /// Upper bound on analyzer calls in flight for one document.
    pub max_concurrent_chunks: usize,
    pub synonyms_path: PathBuf,
    pub database_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: AnalyzerProvider::OpenAi,
            model: None,
            base_url: None,
            api_key: None,
            timeout_secs: 120,
            chunk_size: config::DEFAULT_CHUNK_CHARS,
            max_concurrent_chunks: 4,
            synonyms_path: config::synonyms_path(),
            database_path: config::database_path(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    /// Read a config file if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                serde_json::from_str(&text)?
            }
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get("MEDPARAM_PROVIDER") {
            self.provider = AnalyzerProvider::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: "MEDPARAM_PROVIDER".into(),
                value,
            })?;
        }
        if let Some(value) = get("MEDPARAM_MODEL") {
            self.model = Some(value);
        }
        if let Some(value) = get("MEDPARAM_BASE_URL") {
            self.base_url = Some(value);
        }
        if let Some(value) = get("MEDPARAM_CHUNK_SIZE") {
            self.chunk_size = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "MEDPARAM_CHUNK_SIZE".into(),
                    value,
                })?;
        }
        if let Some(value) = get("OPENAI_API_KEY") {
            self.api_key = Some(value);
        }
        Ok(self)
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn concurrency(&self) -> usize {
        self.max_concurrent_chunks.max(1)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_window() {
        let config = PipelineConfig::default();
        assert_eq!(config.chunk_size, 3500);
        assert_eq!(config.provider, AnalyzerProvider::OpenAi);
        assert_eq!(config.model_name(), "gpt-3.5-turbo");
        assert_eq!(config.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn env_overrides_apply() {
        let config = PipelineConfig::default()
            .with_overrides(env(&[
                ("MEDPARAM_PROVIDER", "ollama"),
                ("MEDPARAM_MODEL", "medllama"),
                ("MEDPARAM_CHUNK_SIZE", "2000"),
                ("OPENAI_API_KEY", "sk-test"),
            ]))
            .unwrap();
        assert_eq!(config.provider, AnalyzerProvider::Ollama);
        assert_eq!(config.model_name(), "medllama");
        assert_eq!(config.base_url(), "http://localhost:11434");
        assert_eq!(config.chunk_size, 2000);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let err = PipelineConfig::default()
            .with_overrides(env(&[("MEDPARAM_CHUNK_SIZE", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = PipelineConfig::default()
            .with_overrides(env(&[("MEDPARAM_PROVIDER", "watson")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"provider": "ollama", "max_concurrent_chunks": 2}"#).unwrap();
        assert_eq!(config.provider, AnalyzerProvider::Ollama);
        assert_eq!(config.concurrency(), 2);
        assert_eq!(config.chunk_size, 3500);
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn load_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("medparam.json");
        std::fs::write(&path, r#"{"timeout_secs": 30}"#).unwrap();
        let config = PipelineConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/medparam.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn api_key_is_never_serialized() {
        let config = PipelineConfig {
            api_key: Some("sk-secret".into()),
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("\"provider\":\"open_ai\""));
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let config = PipelineConfig {
            max_concurrent_chunks: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(config.concurrency(), 1);
    }
}
