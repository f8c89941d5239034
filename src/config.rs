//! Configuration file parser for the pipeline.
//!
//! Unlike a desktop app, the pipeline cannot run without a config file (it
//! needs feed definitions), so a missing file is an error. All other fields
//! use `#[serde(default)]` so any subset of keys can be specified. Unknown
//! keys are accepted but logged as potential typos.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which generation backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    Openai,
    Ollama,
}

/// One feed definition: a source publication, the category its section maps
/// to, and the RSS URLs to crawl.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub source: String,
    pub category: String,
    pub urls: Vec<String>,
}

/// Top-level pipeline configuration.
///
/// Custom Debug impl masks `openai_api_key` to prevent secret leakage in logs
/// and error messages.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path.
    pub database_path: String,

    /// Feed definitions to crawl. Must be non-empty.
    pub feeds: Vec<FeedConfig>,

    /// Hard cap on articles admitted to generation per run.
    pub max_articles_per_run: usize,

    /// Cap on articles admitted per category per run.
    pub max_articles_per_category: usize,

    /// Daily question quota per category.
    pub questions_per_category_per_day: usize,

    /// Minimum composite quality score for a generated question to survive.
    pub question_quality_min_score: f64,

    /// Minimum article score to be admitted to generation.
    pub min_article_score: f64,

    /// Concurrent content-reader fetches during crawling.
    pub max_concurrent_renders: usize,

    /// Retry attempts for transient HTTP failures.
    pub retry_attempts: u32,

    /// Fixed delay between retries, in seconds.
    pub retry_delay_secs: u64,

    /// Categories eligible for generation. Empty = all categories enabled.
    pub enabled_categories: Vec<String>,

    /// Base URL of the article content reader service.
    pub reader_base_url: String,

    /// Generation backend selection.
    pub generator: GeneratorBackend,

    /// OpenAI-compatible API settings. Key may also come from the
    /// QBANK_OPENAI_API_KEY env var, which takes precedence.
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_temperature: f64,
    pub openai_max_tokens: u32,

    /// Ollama settings.
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_temperature: f64,

    /// Control-plane endpoint polled for pause/cancel state. None disables
    /// external control.
    pub control_plane_url: Option<String>,
    pub control_plane_poll_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "qbank.db".to_string(),
            feeds: Vec::new(),
            max_articles_per_run: 50,
            max_articles_per_category: 10,
            questions_per_category_per_day: 15,
            question_quality_min_score: 55.0,
            min_article_score: 0.0,
            max_concurrent_renders: 3,
            retry_attempts: 3,
            retry_delay_secs: 5,
            enabled_categories: Vec::new(),
            reader_base_url: "https://r.jina.ai".to_string(),
            generator: GeneratorBackend::Openai,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4".to_string(),
            openai_temperature: 0.7,
            openai_max_tokens: 2000,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.1:8b".to_string(),
            ollama_temperature: 0.7,
            control_plane_url: None,
            control_plane_poll_secs: 5,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("feeds", &self.feeds.len())
            .field("max_articles_per_run", &self.max_articles_per_run)
            .field("max_articles_per_category", &self.max_articles_per_category)
            .field(
                "questions_per_category_per_day",
                &self.questions_per_category_per_day,
            )
            .field(
                "question_quality_min_score",
                &self.question_quality_min_score,
            )
            .field("min_article_score", &self.min_article_score)
            .field("max_concurrent_renders", &self.max_concurrent_renders)
            .field("enabled_categories", &self.enabled_categories)
            .field("reader_base_url", &self.reader_base_url)
            .field("generator", &self.generator)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("openai_model", &self.openai_model)
            .field("ollama_model", &self.ollama_model)
            .field("control_plane_url", &self.control_plane_url)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;

        // Warn about likely typos at the top level
        if let Ok(raw) = content.parse::<toml::Table>() {
            const KNOWN_KEYS: &[&str] = &[
                "database_path",
                "feeds",
                "max_articles_per_run",
                "max_articles_per_category",
                "questions_per_category_per_day",
                "question_quality_min_score",
                "min_article_score",
                "max_concurrent_renders",
                "retry_attempts",
                "retry_delay_secs",
                "enabled_categories",
                "reader_base_url",
                "generator",
                "openai_base_url",
                "openai_api_key",
                "openai_model",
                "openai_temperature",
                "openai_max_tokens",
                "ollama_base_url",
                "ollama_model",
                "ollama_temperature",
                "control_plane_url",
                "control_plane_poll_secs",
            ];
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            generator = ?config.generator,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[feeds]] entry is required".into(),
            ));
        }
        for feed in &self.feeds {
            if feed.urls.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "feed '{}' has no urls",
                    feed.source
                )));
            }
        }
        if self.generator == GeneratorBackend::Openai && self.resolve_openai_key().is_none() {
            return Err(ConfigError::Invalid(
                "generator = \"openai\" requires openai_api_key or QBANK_OPENAI_API_KEY".into(),
            ));
        }
        if self.max_concurrent_renders == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_renders must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// API key resolution: env var takes precedence over the config file.
    pub fn resolve_openai_key(&self) -> Option<SecretString> {
        std::env::var("QBANK_OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.openai_api_key.clone())
            .map(SecretString::from)
    }

    /// True when the category is eligible for question generation.
    ///
    /// An empty list and a `"*"` entry both mean every category is enabled.
    pub fn category_enabled(&self, category: &str) -> bool {
        self.enabled_categories.is_empty()
            || self
                .enabled_categories
                .iter()
                .any(|c| c == "*" || c.eq_ignore_ascii_case(category))
    }
}
