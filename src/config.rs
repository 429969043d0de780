use serde::{Deserialize, Serialize};
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for Course Digest.
#[derive(Debug, Clone)]
pub struct Config {
    /// Text-generation backend used by every pipeline stage.
    pub generation_provider: GenerationProvider,
    /// Model identifier passed to the provider.
    pub generation_model: String,
    /// API key for the hosted Gemini endpoint.
    pub gemini_api_key: Option<String>,
    /// Optional override for the Gemini base URL.
    pub gemini_url: Option<String>,
    /// Optional override for the Ollama base URL.
    pub ollama_url: Option<String>,
    /// Sampling temperature sent with each generation request.
    pub temperature: f32,
    /// Language the generated material is written in.
    pub language: Language,
    /// Per-attempt HTTP timeout.
    pub request_timeout: Duration,
    /// Size bounds, retry budget, and pacing for the pipeline.
    pub pipeline: PipelineSettings,
}

/// Supported text-generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Hosted Google Gemini API.
    Gemini,
    /// Local Ollama runtime.
    Ollama,
}

/// Output language for generated study material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    /// English output.
    #[default]
    #[serde(rename = "en")]
    English,
    /// Simplified Chinese output.
    #[serde(rename = "zh")]
    Chinese,
}

impl Language {
    /// Short code used in configuration and serialized results.
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Chinese => "zh",
        }
    }

    /// Instruction appended to prompts so the model answers in this language.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::English => "Write your entire answer in English.",
            Self::Chinese => "请全部使用简体中文作答。",
        }
    }

    /// The other supported language.
    pub fn toggled(self) -> Self {
        match self {
            Self::English => Self::Chinese,
            Self::Chinese => Self::English,
        }
    }
}

/// Tunables for chunking, reduction, retries, and pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Maximum characters per chunk handed to the map stage.
    pub chunk_size: usize,
    /// Hard ceiling on characters sent in any single prompt.
    pub prompt_char_limit: usize,
    /// Ceiling on the concatenated payload of one reduce call.
    pub reduce_input_limit: usize,
    /// Number of summaries merged per reduce call.
    pub reduce_batch_size: usize,
    /// Attempts allowed per logical generation call.
    pub max_attempts: usize,
    /// Base of the exponential backoff, in seconds.
    pub backoff_base: u32,
    /// Minimum spacing between the starts of successive generation calls.
    pub call_cooldown: Duration,
    /// Maximum number of map calls in flight.
    pub map_concurrency: usize,
    /// Whether to derive revision notes from the merged summary.
    pub revision_notes: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 12_000,
            prompt_char_limit: 20_000,
            reduce_input_limit: 12_000,
            reduce_batch_size: 3,
            max_attempts: 4,
            backoff_base: 2,
            call_cooldown: Duration::from_millis(1_000),
            map_concurrency: 1,
            revision_notes: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = PipelineSettings::default();

        let generation_provider = match get("DIGEST_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("DIGEST_PROVIDER".into()))?,
            None => GenerationProvider::Gemini,
        };
        let gemini_api_key = get("GEMINI_API_KEY");
        if generation_provider == GenerationProvider::Gemini && gemini_api_key.is_none() {
            return Err(ConfigError::MissingVariable("GEMINI_API_KEY".into()));
        }

        let pipeline = PipelineSettings {
            chunk_size: parse_or(&get, "DIGEST_CHUNK_SIZE", defaults.chunk_size)?,
            prompt_char_limit: parse_or(
                &get,
                "DIGEST_PROMPT_CHAR_LIMIT",
                defaults.prompt_char_limit,
            )?,
            reduce_input_limit: parse_or(
                &get,
                "DIGEST_REDUCE_INPUT_LIMIT",
                defaults.reduce_input_limit,
            )?,
            reduce_batch_size: parse_or(
                &get,
                "DIGEST_REDUCE_BATCH_SIZE",
                defaults.reduce_batch_size,
            )?,
            max_attempts: parse_or(&get, "DIGEST_MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_base: parse_or(&get, "DIGEST_BACKOFF_BASE", defaults.backoff_base)?,
            call_cooldown: Duration::from_millis(parse_or(
                &get,
                "DIGEST_COOLDOWN_MS",
                defaults.call_cooldown.as_millis() as u64,
            )?),
            map_concurrency: parse_or(&get, "DIGEST_MAP_CONCURRENCY", defaults.map_concurrency)?,
            revision_notes: parse_or(&get, "DIGEST_REVISION_NOTES", defaults.revision_notes)?,
        };
        pipeline.validate()?;

        Ok(Self {
            generation_provider,
            generation_model: get("DIGEST_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_api_key,
            gemini_url: get("GEMINI_URL"),
            ollama_url: get("OLLAMA_URL"),
            temperature: parse_or(&get, "DIGEST_TEMPERATURE", 0.3)?,
            language: match get("DIGEST_LANGUAGE") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("DIGEST_LANGUAGE".into()))?,
                None => Language::default(),
            },
            request_timeout: Duration::from_secs(parse_or(
                &get,
                "DIGEST_REQUEST_TIMEOUT_SECS",
                120,
            )?),
            pipeline,
        })
    }
}

impl PipelineSettings {
    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.chunk_size == 0, "DIGEST_CHUNK_SIZE"),
            (self.prompt_char_limit == 0, "DIGEST_PROMPT_CHAR_LIMIT"),
            (self.reduce_input_limit == 0, "DIGEST_REDUCE_INPUT_LIMIT"),
            (self.reduce_batch_size < 2, "DIGEST_REDUCE_BATCH_SIZE"),
            (self.max_attempts == 0, "DIGEST_MAX_ATTEMPTS"),
            (self.backoff_base == 0, "DIGEST_BACKOFF_BASE"),
            (self.map_concurrency == 0, "DIGEST_MAP_CONCURRENCY"),
        ];
        match checks.iter().find(|(invalid, _)| *invalid) {
            Some((_, key)) => Err(ConfigError::InvalidValue((*key).to_string())),
            None => Ok(()),
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "zh" | "cn" | "chinese" => Ok(Self::Chinese),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    if let Some(existing) = CONFIG.get() {
        return Ok(existing);
    }
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        provider = ?config.generation_provider,
        model = %config.generation_model,
        language = config.language.code(),
        chunk_size = config.pipeline.chunk_size,
        batch_size = config.pipeline.reduce_batch_size,
        max_attempts = config.pipeline.max_attempts,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_key_is_present() {
        let config = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "secret")])).unwrap();
        assert_eq!(config.generation_provider, GenerationProvider::Gemini);
        assert_eq!(config.generation_model, "gemini-2.5-flash");
        assert_eq!(config.language, Language::English);
        assert_eq!(config.pipeline, PipelineSettings::default());
    }

    #[test]
    fn gemini_requires_api_key() {
        let error = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "GEMINI_API_KEY"));
    }

    #[test]
    fn ollama_needs_no_key_and_reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DIGEST_PROVIDER", "Ollama"),
            ("DIGEST_MODEL", "llama3.1"),
            ("DIGEST_LANGUAGE", "cn"),
            ("DIGEST_CHUNK_SIZE", "5000"),
            ("DIGEST_REDUCE_BATCH_SIZE", "2"),
            ("DIGEST_COOLDOWN_MS", "0"),
            ("DIGEST_REVISION_NOTES", "false"),
        ]))
        .unwrap();
        assert_eq!(config.generation_provider, GenerationProvider::Ollama);
        assert_eq!(config.generation_model, "llama3.1");
        assert_eq!(config.language, Language::Chinese);
        assert_eq!(config.pipeline.chunk_size, 5000);
        assert_eq!(config.pipeline.reduce_batch_size, 2);
        assert_eq!(config.pipeline.call_cooldown, Duration::ZERO);
        assert!(!config.pipeline.revision_notes);
    }

    #[test]
    fn rejects_batch_size_below_two() {
        let error = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "secret"),
            ("DIGEST_REDUCE_BATCH_SIZE", "1"),
        ]))
        .unwrap_err();
        assert!(
            matches!(error, ConfigError::InvalidValue(key) if key == "DIGEST_REDUCE_BATCH_SIZE")
        );
    }

    #[test]
    fn rejects_unparsable_numbers() {
        let error = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "secret"),
            ("DIGEST_MAX_ATTEMPTS", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "DIGEST_MAX_ATTEMPTS"));
    }

    #[test]
    fn language_toggles_between_variants() {
        assert_eq!(Language::English.toggled(), Language::Chinese);
        assert_eq!(Language::Chinese.toggled().code(), "en");
    }
}
