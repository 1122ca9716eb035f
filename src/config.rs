use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::Level;

use crate::error::{RagError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
const DEFAULT_MERMAID_BASE_URL: &str = "https://mermaid.ink/img/";

/// Connection settings for the hosted model service.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Retrieval and rendering parameters, fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub mermaid_base_url: String,
    pub diagrams: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 100,
            mermaid_base_url: DEFAULT_MERMAID_BASE_URL.to_string(),
            diagrams: true,
        }
    }
}

pub struct AppConfig {
    pub discord_token: String,
    pub guild_id: Option<u64>,
    pub corpus_path: PathBuf,
    pub index_dir: PathBuf,
    pub log_level: Level,
    pub llm: LlmSettings,
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Build the configuration from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("LLM_API_KEY").ok_or(RagError::MissingCredential)?;
        let discord_token = get("DISCORD_TOKEN")
            .ok_or_else(|| RagError::Config("DISCORD_TOKEN required".to_string()))?;

        let top_k: usize = parse_or(get("TOP_K"), "TOP_K", 100)?;
        if top_k == 0 {
            return Err(RagError::Config("TOP_K must be at least 1".to_string()));
        }

        let timeout_secs: u64 = parse_or(get("LLM_TIMEOUT_SECS"), "LLM_TIMEOUT_SECS", 120)?;

        Ok(Self {
            discord_token,
            guild_id: get("DISCORD_GUILD_ID")
                .map(|s| parse_value::<u64>(&s, "DISCORD_GUILD_ID"))
                .transpose()?,
            corpus_path: PathBuf::from(
                get("CORPUS_PATH").unwrap_or_else(|| "./corpus/corpus.json".to_string()),
            ),
            index_dir: PathBuf::from(get("INDEX_DIR").unwrap_or_else(|| "./data/index".to_string())),
            log_level: parse_or(get("LOG_LEVEL"), "LOG_LEVEL", Level::DEBUG)?,
            llm: LlmSettings {
                base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                embedding_model: get("EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                api_key,
                timeout: Duration::from_secs(timeout_secs),
            },
            pipeline: PipelineSettings {
                top_k,
                mermaid_base_url: get("MERMAID_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_MERMAID_BASE_URL.to_string()),
                diagrams: parse_or(get("DIAGRAMS"), "DIAGRAMS", true)?,
            },
        })
    }
}

fn parse_value<T: FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| RagError::Config(format!("invalid value for {}: {:?}", key, raw)))
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(v) => parse_value(&v, key),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            AppConfig::from_lookup(lookup(&[("LLM_API_KEY", "sk-test"), ("DISCORD_TOKEN", "t")]))
                .unwrap();
        assert_eq!(config.pipeline.top_k, 100);
        assert!(config.pipeline.diagrams);
        assert_eq!(config.pipeline.mermaid_base_url, "https://mermaid.ink/img/");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.embedding_model, "text-embedding-3-large");
        assert_eq!(config.llm.timeout, Duration::from_secs(120));
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(config.guild_id.is_none());
    }

    #[test]
    fn test_missing_credential() {
        let result = AppConfig::from_lookup(lookup(&[("DISCORD_TOKEN", "t")]));
        assert!(matches!(result, Err(RagError::MissingCredential)));
    }

    #[test]
    fn test_blank_credential_is_missing() {
        let result =
            AppConfig::from_lookup(lookup(&[("LLM_API_KEY", "   "), ("DISCORD_TOKEN", "t")]));
        assert!(matches!(result, Err(RagError::MissingCredential)));
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("LLM_API_KEY", "sk-test"),
            ("DISCORD_TOKEN", "t"),
            ("DISCORD_GUILD_ID", "12345"),
            ("TOP_K", "5"),
            ("DIAGRAMS", "false"),
            ("LOG_LEVEL", "info"),
            ("CORPUS_PATH", "/tmp/c.json"),
        ]))
        .unwrap();
        assert_eq!(config.guild_id, Some(12345));
        assert_eq!(config.pipeline.top_k, 5);
        assert!(!config.pipeline.diagrams);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.corpus_path, PathBuf::from("/tmp/c.json"));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let result = AppConfig::from_lookup(lookup(&[
            ("LLM_API_KEY", "sk-test"),
            ("DISCORD_TOKEN", "t"),
            ("TOP_K", "0"),
        ]));
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let result = AppConfig::from_lookup(lookup(&[
            ("LLM_API_KEY", "sk-test"),
            ("DISCORD_TOKEN", "t"),
            ("TOP_K", "lots"),
        ]));
        assert!(matches!(result, Err(RagError::Config(_))));
    }
}
