//! Configuration for novelforge.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Main configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub generation: GenerationConfig,
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            api: ApiConfig::from_env()?,
            generation: GenerationConfig::from_env()?,
            retry: RetryConfig::from_env()?,
        })
    }
}

/// Remote generation service configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Chat-completions endpoint URL.
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    /// Context budget in bytes of accumulated text; drives both the prompt's
    /// trailing-context slice and summarization triggering.
    pub context_budget: usize,
    pub request_timeout: Duration,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("NOVELFORGE_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("NOVELFORGE_API_KEY".to_string()))?;

        Ok(Self {
            base_url: env_or("NOVELFORGE_API_URL", "https://aiapi.space/v1/chat/completions"),
            api_key: SecretString::from(api_key),
            model: env_or("NOVELFORGE_MODEL", "gpt-4.5-preview"),
            temperature: env_parse("NOVELFORGE_TEMPERATURE", 0.8)?,
            top_p: env_parse("NOVELFORGE_TOP_P", 0.9)?,
            max_tokens: env_parse("NOVELFORGE_MAX_TOKENS", 4000)?,
            context_budget: env_parse("NOVELFORGE_CONTEXT_BUDGET", 100_000)?,
            request_timeout: Duration::from_secs(env_parse("NOVELFORGE_REQUEST_TIMEOUT_SECS", 120)?),
        })
    }
}

/// Generation loop and content-quality configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Number of fresh novels per batch.
    pub num_novels: usize,
    /// Bounded-concurrency gate: at most this many jobs generate at once.
    pub max_workers: usize,
    pub genre: String,
    pub language: String,
    /// Target accumulated length in bytes.
    pub target_length: usize,
    /// Produce a closing chunk once 90% of the target is reached.
    pub create_ending: bool,
    /// Pick a random genre per job instead of `genre`.
    pub random_genres: bool,
    /// One genre per job for a batch; overrides `genre`/`random_genres`.
    pub batch_genres: Vec<String>,
    /// User-supplied prompt template overriding the genre tables.
    pub custom_prompt: Option<String>,
    /// Bytes of new text between automatic summaries. Zero disables.
    pub summary_interval: usize,
    /// Accumulated size beyond which long-text mode (stricter dedup,
    /// anti-repetition prompt emphasis) activates.
    pub long_text_threshold: usize,
    /// Step-level similarity above which a freshly generated chunk is
    /// rejected against the trailing window and regenerated once.
    pub step_similarity_threshold: f64,
    /// Paragraph-level similarity above which dedup drops a paragraph.
    pub paragraph_similarity_threshold: f64,
    /// Bytes of new text between long-text quality passes over the tail.
    pub quality_check_interval: usize,
    /// Trailing window size for the step-level duplicate check.
    pub dup_window: usize,
    pub output_dir: PathBuf,
    /// Batch-continuation mode: resume every text+metadata pair found here.
    pub continue_from_dir: Option<PathBuf>,
}

impl GenerationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let output_dir = match std::env::var("NOVELFORGE_OUTPUT_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => default_output_dir(),
        };

        Ok(Self {
            num_novels: env_parse("NOVELFORGE_NUM_NOVELS", 1)?,
            max_workers: env_parse("NOVELFORGE_MAX_WORKERS", 3)?,
            genre: env_or("NOVELFORGE_GENRE", "fantasy"),
            language: env_or("NOVELFORGE_LANGUAGE", "en"),
            target_length: env_parse("NOVELFORGE_TARGET_LENGTH", 20_000)?,
            create_ending: env_parse("NOVELFORGE_CREATE_ENDING", false)?,
            random_genres: env_parse("NOVELFORGE_RANDOM_GENRES", false)?,
            batch_genres: Vec::new(),
            custom_prompt: std::env::var("NOVELFORGE_CUSTOM_PROMPT").ok(),
            summary_interval: env_parse("NOVELFORGE_SUMMARY_INTERVAL", 10_000)?,
            long_text_threshold: env_parse("NOVELFORGE_LONG_TEXT_THRESHOLD", 250_000)?,
            step_similarity_threshold: env_parse("NOVELFORGE_STEP_SIMILARITY", 0.7)?,
            paragraph_similarity_threshold: env_parse("NOVELFORGE_PARAGRAPH_SIMILARITY", 0.8)?,
            quality_check_interval: env_parse("NOVELFORGE_QUALITY_CHECK_INTERVAL", 5_000)?,
            dup_window: env_parse("NOVELFORGE_DUP_WINDOW", 10_000)?,
            output_dir,
            continue_from_dir: std::env::var("NOVELFORGE_CONTINUE_FROM_DIR")
                .ok()
                .map(PathBuf::from),
        })
    }
}

/// Retry/backoff configuration for remote generation calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Backoff base; delay is `base * 1.5^min(attempt, 10)`.
    pub base_delay: Duration,
    /// Granularity at which backoff and pause waits re-check signals.
    pub poll_tick: Duration,
    /// Fixed delay before re-entering the loop after a failed step.
    pub step_cooldown: Duration,
}

impl RetryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_attempts: env_parse("NOVELFORGE_MAX_RETRIES", 50)?,
            base_delay: Duration::from_millis(env_parse("NOVELFORGE_RETRY_BASE_MS", 1000)?),
            poll_tick: Duration::from_millis(env_parse("NOVELFORGE_POLL_TICK_MS", 1000)?),
            step_cooldown: Duration::from_millis(env_parse("NOVELFORGE_STEP_COOLDOWN_MS", 3000)?),
        })
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            base_delay: Duration::from_secs(1),
            poll_tick: Duration::from_secs(1),
            step_cooldown: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
impl Config {
    /// A fully offline configuration for unit tests.
    pub(crate) fn default_for_tests() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:0/v1/chat/completions".to_string(),
                api_key: SecretString::from("test-key"),
                model: "test-model".to_string(),
                temperature: 0.8,
                top_p: 0.9,
                max_tokens: 4000,
                context_budget: 100_000,
                request_timeout: Duration::from_secs(5),
            },
            generation: GenerationConfig {
                num_novels: 1,
                max_workers: 2,
                genre: "fantasy".to_string(),
                language: "en".to_string(),
                target_length: 1_000,
                create_ending: false,
                random_genres: false,
                batch_genres: Vec::new(),
                custom_prompt: None,
                summary_interval: 10_000,
                long_text_threshold: 250_000,
                step_similarity_threshold: 0.7,
                paragraph_similarity_threshold: 0.8,
                quality_check_interval: 5_000,
                dup_window: 10_000,
                output_dir: PathBuf::from("."),
                continue_from_dir: None,
            },
            retry: RetryConfig::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs::document_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("novelforge_output")
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_to_default() {
        let v: usize = env_parse("NOVELFORGE_TEST_UNSET_KEY", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn env_parse_rejects_garbage() {
        // Env mutation is process-global; use a key no other test touches.
        unsafe { std::env::set_var("NOVELFORGE_TEST_BAD_USIZE", "not-a-number") };
        let result: Result<usize, _> = env_parse("NOVELFORGE_TEST_BAD_USIZE", 1);
        assert!(result.is_err());
        unsafe { std::env::remove_var("NOVELFORGE_TEST_BAD_USIZE") };
    }

    #[test]
    fn retry_defaults_match_policy() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 50);
        assert_eq!(retry.base_delay, Duration::from_secs(1));
    }
}
