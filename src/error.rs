//! Error types for novelforge.

/// Top-level error type for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome classification for a single remote generation call.
///
/// Every variant is retryable; `TooShort` and `Refusal` additionally cause
/// the retry policy to rework the prompt before the next attempt rather than
/// resending it verbatim.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("generated content too short ({len} chars)")]
    TooShort { len: usize },

    #[error("content policy refusal detected in response")]
    Refusal,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error: status {status}")]
    Server { status: u16 },

    #[error("no usable text in response: {detail}")]
    Parse { detail: String },
}

/// Checkpoint persistence errors. A failed checkpoint write is logged and
/// the job continues; the in-memory text keeps advancing and the next
/// successful write covers it.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not resumable: {reason}")]
    NotResumable { reason: String },
}

/// Job lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("all {attempts} generation attempts failed: {last}")]
    RetriesExhausted { attempts: u32, last: LlmError },

    #[error("job interrupted by stop signal")]
    Interrupted,
}
